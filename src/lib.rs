pub mod cli;
pub mod database_ops;
pub mod tracing;

pub mod util {
    pub mod env;
}
