pub mod prepare_env;
mod test_gateway;

pub use test_gateway::TestGateway;
