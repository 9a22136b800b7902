//! AWS Voyager - a terminal dashboard for an AWS account.
//!
//! Shows the ECS services of a cluster, Lambda functions and API Gateways,
//! tails their CloudWatch logs live, opens shells in running containers and
//! restarts or redeploys services and functions.

pub mod app;
pub mod aws;
pub mod cli;
pub mod config;
pub mod github;
pub mod logtail;
pub mod shell;
pub mod snapshot;
pub mod ui;
