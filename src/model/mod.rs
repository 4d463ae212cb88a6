pub mod dual_head;
pub mod graph_model;
pub mod print_model_stats;
pub mod weight_init;
