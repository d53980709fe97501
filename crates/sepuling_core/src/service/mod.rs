//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep edge adapters decoupled from storage details.

pub mod sepulka_service;
