//! Runner variants
//!
//! One runner per run mode. Batch modes (`file`, `database-produce`,
//! `serverless-invoker`, `install-dependency`) finish on their own and report
//! [`RunnerError::Cancelled`](crate::RunnerError::Cancelled) when interrupted.
//! Service modes (`database`, `web-service`, `serverless-function`) run until
//! the token fires and treat that as a clean stop.

mod database;
mod file;
mod function;
mod install;
mod invoker;
mod web;

pub use database::{DatabaseRole, DatabaseRunner};
pub use file::FileRunner;
pub use function::FunctionRunner;
pub use install::InstallRunner;
pub use invoker::InvokerRunner;
pub use web::WebRunner;
