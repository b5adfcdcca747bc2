pub mod reverse_ops;
