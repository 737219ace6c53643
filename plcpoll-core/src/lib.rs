//! plcpoll Core
//!
//! Core types shared by the plcpoll services.
//!
//! This crate contains:
//! - Domain types: device keys, device and register descriptors, measurements
//! - DTOs: the line protocol (commands in, events out) and backend response shapes

pub mod domain;
pub mod dto;
