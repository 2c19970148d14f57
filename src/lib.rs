pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod queue;
pub(crate) mod repositories;
pub(crate) mod services;
pub(crate) mod tasks;

use crate::core::{config::Settings, state::AppState, telemetry};

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let state = AppState::new(settings, db_pool);

    tracing::info!(
        provider = state.settings().ai().provider.as_str(),
        model_id = %state.settings().ai().model_id,
        environment = %state.settings().runtime().environment.as_str(),
        "stutrack grading worker starting"
    );

    queue::consumer::run(state).await
}
