//! Shared step behaviour: attaching errors and persisting incomplete
//! pipelines.

use crate::context::Command;
use crate::errors::PipelineError;
use crate::model::Pipeline;
use crate::ports::ChainPorts;
use anyhow::Context;
use tracing::{debug, warn};

/// Attaches `error` to the pipeline.
///
/// If the error carries a drop reason and the caller asked to keep
/// incomplete pipelines, the pipeline is dropped and persisted.
pub(crate) async fn error(
    pipeline: &mut Pipeline,
    command: &Command,
    ports: &ChainPorts,
    step: &str,
    error: PipelineError,
) {
    let drop_reason = error.drop_reason;
    debug!(step, kind = %error.kind, message = %error.message, "Pipeline error");
    pipeline.add_error(error);

    if let Some(reason) = drop_reason {
        if command.save_incompleted && !pipeline.is_persisted() {
            pipeline.drop_with(reason);
            persist_incomplete(pipeline, ports, step).await;
        }
    }
}

/// Saves a pipeline that will not run, allocating its IID first.
///
/// Failures are tracked, not raised; the pipeline stays unpersisted.
pub(crate) async fn persist_incomplete(pipeline: &mut Pipeline, ports: &ChainPorts, step: &str) {
    if pipeline.is_persisted() {
        return;
    }

    if pipeline.iid.is_none() {
        match ports.pipelines.allocate_iid(pipeline.project_id).await {
            Ok(iid) => pipeline.iid = Some(iid),
            Err(e) => {
                let e = anyhow::Error::new(e).context("allocating iid for an incomplete pipeline");
                ports.error_tracker.track(&e, step);
                return;
            }
        }
    }

    let result = ports
        .pipelines
        .create_pipeline(pipeline.clone())
        .await
        .context("persisting an incomplete pipeline");

    match result {
        Ok(saved) => *pipeline = saved,
        Err(e) => {
            warn!(step, status = %pipeline.status, "Failed to persist incomplete pipeline");
            ports.error_tracker.track(&e, step);
            release_iid(pipeline, ports, step).await;
        }
    }
}

/// Hands an allocated but unused IID back to the project sequence.
pub(crate) async fn release_iid(pipeline: &mut Pipeline, ports: &ChainPorts, step: &str) {
    let Some(iid) = pipeline.iid.take() else {
        return;
    };
    if let Err(e) = ports.pipelines.release_iid(pipeline.project_id, iid).await {
        let e = anyhow::Error::new(e).context(format!("releasing iid {iid}"));
        ports.error_tracker.track(&e, step);
    }
}
