//! # Ports Layer (Middle Hexagon)
//!
//! Trait definitions for smart contract execution: the interfaces between
//! the domain and the outside world.
//!
//! - **Driving ports (inbound)**: `SmartContractApi`
//! - **Driven ports (outbound)**: `StateAccess`, `SignatureVerifier`, `BlockHashOracle`
//! - No concrete implementations in this module

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
