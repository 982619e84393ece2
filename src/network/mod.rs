/*
 * This module defines the graph built from collected adjacencies and how it is rendered.
 */

pub mod network_graph;
pub mod render;
