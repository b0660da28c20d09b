use core_lib::{CoreError, services::ProcessOutcome};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
};
use tracing::{error, info, warn};

/// What to tell the broker once a delivery has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Put the message back once; a second failure discards it.
    Requeue,
    Discard,
}

impl Disposition {
    pub fn for_result(result: &Result<ProcessOutcome, CoreError>, redelivered: bool) -> Self {
        match result {
            Ok(_) => Disposition::Ack,
            // Undecodable payloads never get better.
            Err(CoreError::Deserialization(_)) => Disposition::Discard,
            Err(CoreError::Infrastructure(_)) if !redelivered => Disposition::Requeue,
            Err(_) => Disposition::Discard,
        }
    }
}

pub fn log_outcome(result: &Result<ProcessOutcome, CoreError>) {
    match result {
        Ok(ProcessOutcome::Succeeded(cmd)) => {
            info!(command_id = %cmd.command_id, "Command finished with SUCCESS")
        }
        Ok(ProcessOutcome::Failed(cmd)) => {
            warn!(
                command_id = %cmd.command_id,
                error = cmd.error_message.as_deref().unwrap_or("-"),
                "Command finished with ERROR"
            )
        }
        Ok(ProcessOutcome::Skipped { command_id, reason }) => {
            info!(command_id = %command_id, reason = %reason, "Notification skipped")
        }
        Err(e) => error!("Error handling command notification: {}", e),
    }
}

pub async fn settle(delivery: &Delivery, disposition: Disposition) {
    let outcome = match disposition {
        Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
        Disposition::Requeue => {
            delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
        }
        Disposition::Discard => {
            delivery
                .nack(BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await
        }
    };
    if let Err(e) = outcome {
        error!(?disposition, "Failed to settle delivery: {}", e);
    }
}
