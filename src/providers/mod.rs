//! Default implementations of the cloud and container-engine capabilities

pub mod aws_cli;
pub mod docker_cli;

pub use aws_cli::AwsCliOperations;
pub use docker_cli::DockerCli;
