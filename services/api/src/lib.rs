mod cli;
mod infra;
mod routes;
mod server;

use credit_pipeline::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
