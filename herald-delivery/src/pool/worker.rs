//! A single delivery worker

use std::sync::Arc;

use herald_common::{
    FailureClass, Recipient, RecipientOutcome, dispatch, internal,
    tracing::{debug, error, warn},
};
use herald_store::StoreError;

use super::{RecipientQueue, RunContext};
use crate::{DeliveryError, error::SystemicError};

/// How delivery to one recipient ended
enum Attempt {
    /// Terminal outcome ready to be recorded
    Resolved(RecipientOutcome),
    /// The run stopped first; the recipient stays pending
    Stopped,
    /// The gateway or sender identity is unusable; the recipient stays pending
    Systemic(DeliveryError),
}

pub(super) async fn run(id: usize, ctx: Arc<RunContext>, queue: Arc<RecipientQueue>) {
    let mut delivered = 0_u64;

    while !ctx.stop.is_cancelled() {
        let Some(recipient) = queue.pop() else {
            break;
        };

        match deliver(&ctx, &recipient).await {
            Attempt::Resolved(outcome) => {
                settle(&ctx, outcome).await;
                delivered += 1;
            }
            Attempt::Stopped => {
                debug!(
                    worker = id,
                    campaign_id = %ctx.campaign_id,
                    recipient = %recipient,
                    "Run stopped, leaving recipient pending"
                );
                break;
            }
            Attempt::Systemic(e) => {
                error!(
                    worker = id,
                    campaign_id = %ctx.campaign_id,
                    recipient = %recipient,
                    error = %e,
                    "Systemic delivery failure"
                );
                ctx.abort(e.to_string());
                break;
            }
        }
    }

    internal!(
        worker = id,
        campaign_id = %ctx.campaign_id,
        delivered,
        "Delivery worker finished"
    );
}

/// Send to one recipient, retrying transient failures with backoff
async fn deliver(ctx: &RunContext, recipient: &Recipient) -> Attempt {
    let mut retries = 0;

    loop {
        if ctx
            .limiter
            .acquire(ctx.message.channel, &ctx.stop)
            .await
            .is_err()
        {
            return Attempt::Stopped;
        }

        dispatch!(
            campaign_id = %ctx.campaign_id,
            recipient = %recipient,
            attempt = retries + 1,
            "Sending"
        );

        let error = match ctx.sender.send(recipient, &ctx.message).await {
            Ok(()) => {
                return Attempt::Resolved(RecipientOutcome::sent(
                    ctx.campaign_id.clone(),
                    recipient.clone(),
                    retries + 1,
                ));
            }
            Err(e) => e,
        };

        let class = match error.failure_class() {
            None => return Attempt::Systemic(error),
            Some(FailureClass::TransientExhausted) if ctx.retry.should_retry(retries) => {
                retries += 1;
                let delay = ctx.retry.backoff(retries);
                debug!(
                    campaign_id = %ctx.campaign_id,
                    recipient = %recipient,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Transient failure, retrying"
                );

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = ctx.stop.cancelled() => return Attempt::Stopped,
                }
                continue;
            }
            Some(class) => class,
        };

        return Attempt::Resolved(RecipientOutcome::failed(
            ctx.campaign_id.clone(),
            recipient.clone(),
            retries + 1,
            class,
            error.to_string(),
        ));
    }
}

/// Persist a terminal outcome and count it
async fn settle(ctx: &RunContext, outcome: RecipientOutcome) {
    let recorded = match ctx.recorder.record(&outcome).await {
        Ok(()) => true,
        Err(e) if matches!(e.source, StoreError::AlreadyTerminal { .. }) => {
            // Resolved elsewhere; must not be counted twice.
            warn!(
                campaign_id = %ctx.campaign_id,
                recipient = %outcome.recipient,
                "Outcome already recorded, not counting it twice"
            );
            return;
        }
        Err(e) => {
            error!(
                campaign_id = %ctx.campaign_id,
                recipient = %outcome.recipient,
                attempts = e.attempts,
                error = %e.source,
                "Failed to record outcome, keeping it for reconciliation"
            );
            ctx.unrecorded.lock().push(outcome.clone());
            false
        }
    };

    match ctx.aggregator.apply(&outcome, recorded) {
        Ok(snapshot) => debug!(
            campaign_id = %ctx.campaign_id,
            sent = snapshot.sent,
            failed = snapshot.failed,
            total = snapshot.total,
            "Progress"
        ),
        Err(e) => error!(
            campaign_id = %ctx.campaign_id,
            recipient = %outcome.recipient,
            error = %e,
            "Failed to count outcome"
        ),
    }

    if let Some(streak) = ctx.outage.observe(&outcome) {
        ctx.abort(DeliveryError::from(SystemicError::GatewayOutage(streak)).to_string());
    }
}
