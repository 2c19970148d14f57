use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client};
use tokio::sync::watch;

use crate::core::config::Settings;
use crate::core::state::AppState;
use crate::queue::GradeRequest;
use crate::repositories::store::PgGraderStore;
use crate::services::model_grader::LlmGrader;
use crate::services::providers;
use crate::tasks::grading::{GradingPipeline, Outcome};

/// Message-transport port. One delivery is in flight at a time and every
/// delivery is settled exactly once: acknowledged, requeued, or rejected.
#[async_trait]
pub(crate) trait QueueChannel: Send {
    async fn receive(&mut self) -> Result<Option<String>>;
    async fn acknowledge(&mut self, payload: &str) -> Result<()>;
    async fn requeue(&mut self, payload: &str) -> Result<()>;
    async fn reject(&mut self, payload: &str) -> Result<()>;
}

/// Reliable redis list queue: receive moves the delivery into a processing
/// list, settling removes it from there. A crash leaves the delivery in the
/// processing list, where the next startup recovers it.
pub(crate) struct RedisQueue {
    manager: ConnectionManager,
    queue_key: String,
    processing_key: String,
    block_seconds: f64,
}

impl RedisQueue {
    pub(crate) async fn connect(settings: &Settings) -> Result<Self> {
        let client =
            Client::open(settings.queue().redis_url()).context("Failed to open Redis client")?;
        let manager =
            ConnectionManager::new(client).await.context("Failed to connect to Redis")?;

        Ok(Self {
            manager,
            queue_key: settings.queue().queue_key.clone(),
            processing_key: settings.queue().processing_key(),
            block_seconds: settings.queue().block_seconds as f64,
        })
    }

    pub(crate) async fn recover_processing(&mut self) -> Result<u64> {
        let mut recovered = 0;
        loop {
            let moved: Option<String> = cmd("LMOVE")
                .arg(&self.processing_key)
                .arg(&self.queue_key)
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut self.manager)
                .await
                .context("Failed to recover processing list")?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn remove_processing(&mut self, payload: &str) -> Result<()> {
        cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(payload)
            .query_async::<_, i64>(&mut self.manager)
            .await
            .context("Failed to settle delivery")?;
        Ok(())
    }
}

#[async_trait]
impl QueueChannel for RedisQueue {
    async fn receive(&mut self) -> Result<Option<String>> {
        let payload: Option<String> = cmd("BLMOVE")
            .arg(&self.queue_key)
            .arg(&self.processing_key)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(self.block_seconds)
            .query_async(&mut self.manager)
            .await
            .context("Failed to receive from queue")?;
        Ok(payload)
    }

    async fn acknowledge(&mut self, payload: &str) -> Result<()> {
        self.remove_processing(payload).await
    }

    async fn requeue(&mut self, payload: &str) -> Result<()> {
        // Push back before removing so the delivery is never lost between the
        // two steps; at-least-once tolerates the brief duplicate.
        cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(payload)
            .query_async::<_, i64>(&mut self.manager)
            .await
            .context("Failed to requeue delivery")?;
        self.remove_processing(payload).await
    }

    async fn reject(&mut self, payload: &str) -> Result<()> {
        self.remove_processing(payload).await
    }
}

pub(crate) async fn run(state: AppState) -> Result<()> {
    let provider = providers::from_settings(state.settings())?;
    let provider_name = provider.name();
    let grader = LlmGrader::new(provider, state.settings().ai().max_retries);
    let store = PgGraderStore::new(state.db().clone());

    let pipeline = GradingPipeline::new(
        Arc::new(store),
        Arc::new(grader),
        provider_name,
        &state.settings().ai().model_id,
        state.settings().grader().max_task_attempts,
    );

    let mut queue = RedisQueue::connect(state.settings()).await?;
    let recovered = queue.recover_processing().await?;
    if recovered > 0 {
        tracing::info!(recovered, "recovered in-flight deliveries from previous run");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        crate::core::shutdown::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    tracing::info!(queue_key = %state.settings().queue().queue_key, "grading consumer started");

    consume_loop(&mut queue, &pipeline, shutdown_rx).await
}

pub(crate) async fn consume_loop<C: QueueChannel>(
    queue: &mut C,
    pipeline: &GradingPipeline,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let payload = tokio::select! {
            _ = shutdown.changed() => break,
            received = queue.receive() => match received {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(error = %err, "queue receive failed");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    continue;
                }
            },
        };

        // The in-flight delivery is fully settled before the next receive,
        // shutdown included.
        settle(queue, pipeline, &payload).await;
    }

    tracing::info!("grading consumer stopped");
    Ok(())
}

async fn settle<C: QueueChannel>(queue: &mut C, pipeline: &GradingPipeline, payload: &str) {
    let request = match GradeRequest::decode(payload.as_bytes()) {
        Ok(request) => request,
        Err(err) => {
            tracing::error!(error = %err, "undecodable grading request; rejecting");
            if let Err(err) = queue.reject(payload).await {
                tracing::error!(error = %err, "failed to reject delivery");
            }
            return;
        }
    };

    let outcome = pipeline.process(&request).await;
    let settled = match outcome {
        Outcome::Acknowledge => queue.acknowledge(payload).await,
        Outcome::Retry => queue.requeue(payload).await,
        Outcome::Drop => queue.reject(payload).await,
    };

    if let Err(err) = settled {
        // The delivery stays in the processing list; startup recovery will
        // requeue it.
        tracing::error!(outcome = outcome.as_str(), error = %err, "failed to settle delivery");
    }
}
