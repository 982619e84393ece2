/*
 * This module provides the device sessions used during discovery.
 * `core` defines the session seam, `ssh` the transport and `netconf` the Junos NETCONF session on top of it.
 */

pub mod core;
pub mod netconf;
pub mod ssh;
