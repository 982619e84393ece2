/*
 * This module turns raw device replies into typed records.
 * Only Junos NETCONF replies are supported.
 */

pub mod junos;
