// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod node_server;
pub mod relay_server;

pub use errors::{ApiError, ErrorResponse};
pub use node_server::{node_router, start_node_server, NodeState};
pub use relay_server::{relay_router, start_relay_server, RelayState};
