//! Router: picks the executor for a turn.
//!
//! A fresh turn is classified by the oracle exactly once. A resumed turn
//! re-enters the intent stored in its context without consulting the
//! oracle; [`ExecutionContext::resumed`] is the only signal for that.

use std::sync::Arc;

use easel_core::SceneSummary;
use easel_storage::ThreadMessage;

use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::intent::{Intent, IntentRequest};
use crate::oracle::IntentOracle;

const DEFAULT_CLARIFICATION: &str =
    "I can draw, delete, modify or count shapes. What would you like to do?";

#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Run the executor for this intent.
    Dispatch(Intent),
    /// Not an editing request; reply and end the turn.
    Clarify(String),
    /// The oracle failed; end the turn as a classification failure.
    Reject(String),
}

pub struct Router {
    oracle: Arc<dyn IntentOracle>,
}

impl Router {
    pub fn new(oracle: Arc<dyn IntentOracle>) -> Self {
        Router { oracle }
    }

    /// Route one turn. `fresh` carries the user text and scene summary for
    /// a new turn and is ignored when the context is resumed.
    pub async fn route(
        &self,
        ctx: &mut ExecutionContext,
        history: &mut Vec<ThreadMessage>,
        fresh: Option<(&str, &SceneSummary)>,
    ) -> Result<RouteDecision, EngineError> {
        if ctx.resumed {
            let intent = ctx
                .intent
                .ok_or_else(|| EngineError::CorruptContext("resumed without an intent".into()))?;
            match &ctx.operation_params {
                Some(params) if params.intent() == intent => {}
                _ => {
                    return Err(EngineError::CorruptContext(format!(
                        "resumed {intent} without matching parameters"
                    )))
                }
            }
            trace(history, intent);
            tracing::debug!(intent = %intent, "router re-entered stored intent");
            return Ok(RouteDecision::Dispatch(intent));
        }

        let (text, scene) = fresh
            .ok_or_else(|| EngineError::CorruptContext("fresh turn without input".into()))?;
        match self.oracle.classify(text, scene).await {
            Ok(IntentRequest::None { reply }) => {
                ctx.clear();
                trace(history, Intent::None);
                Ok(RouteDecision::Clarify(
                    reply.unwrap_or_else(|| DEFAULT_CLARIFICATION.to_string()),
                ))
            }
            Ok(request) => {
                let intent = request.intent();
                ctx.intent = Some(intent);
                ctx.operation_params = Some(request);
                trace(history, intent);
                tracing::info!(intent = %intent, "router classified request");
                Ok(RouteDecision::Dispatch(intent))
            }
            Err(e) => {
                tracing::warn!(error = %e, "intent classification failed");
                ctx.clear();
                Ok(RouteDecision::Reject(format!(
                    "Sorry, I could not understand that request ({e})."
                )))
            }
        }
    }
}

fn trace(history: &mut Vec<ThreadMessage>, intent: Intent) {
    history.push(ThreadMessage {
        role: "system".to_string(),
        content: format!("Router: routed to {intent}"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{QueryParams, TargetSelector};
    use crate::oracle::OracleError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOracle {
        calls: AtomicUsize,
        answer: fn() -> Result<IntentRequest, OracleError>,
    }

    #[async_trait]
    impl IntentOracle for CountingOracle {
        async fn classify(
            &self,
            _text: &str,
            _scene: &SceneSummary,
        ) -> Result<IntentRequest, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.answer)()
        }
    }

    fn router(answer: fn() -> Result<IntentRequest, OracleError>) -> (Router, Arc<CountingOracle>) {
        let oracle = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
            answer,
        });
        (Router::new(oracle.clone()), oracle)
    }

    #[tokio::test]
    async fn fresh_turn_classifies_once() {
        let (router, oracle) = router(|| Ok(IntentRequest::Query(QueryParams::default())));
        let mut ctx = ExecutionContext::default();
        let mut history = Vec::new();
        let decision = router
            .route(&mut ctx, &mut history, Some(("how many", &SceneSummary::default())))
            .await
            .unwrap();
        assert_eq!(decision, RouteDecision::Dispatch(Intent::Query));
        assert_eq!(ctx.intent, Some(Intent::Query));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert_eq!(history[0].content, "Router: routed to query");
    }

    #[tokio::test]
    async fn resumed_turn_skips_oracle() {
        let (router, oracle) = router(|| Ok(IntentRequest::None { reply: None }));
        let mut ctx = ExecutionContext {
            intent: Some(Intent::Delete),
            operation_params: Some(IntentRequest::Delete(crate::intent::DeleteParams {
                target: TargetSelector::Id { id: "x".into() },
            })),
            resumed: true,
            ..ExecutionContext::default()
        };
        let decision = router.route(&mut ctx, &mut Vec::new(), None).await.unwrap();
        assert_eq!(decision, RouteDecision::Dispatch(Intent::Delete));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resumed_without_params_is_corrupt() {
        let (router, _) = router(|| Ok(IntentRequest::None { reply: None }));
        let mut ctx = ExecutionContext {
            intent: Some(Intent::Delete),
            resumed: true,
            ..ExecutionContext::default()
        };
        let err = router.route(&mut ctx, &mut Vec::new(), None).await.unwrap_err();
        assert!(matches!(err, EngineError::CorruptContext(_)));
    }

    #[tokio::test]
    async fn none_intent_clears_context() {
        let (router, _) = router(|| Ok(IntentRequest::None { reply: None }));
        let mut ctx = ExecutionContext {
            target_object_ids: vec!["stale".into()],
            ..ExecutionContext::default()
        };
        let decision = router
            .route(&mut ctx, &mut Vec::new(), Some(("hi", &SceneSummary::default())))
            .await
            .unwrap();
        assert_eq!(decision, RouteDecision::Clarify(DEFAULT_CLARIFICATION.to_string()));
        assert_eq!(ctx, ExecutionContext::default());
    }

    #[tokio::test]
    async fn oracle_failure_rejects() {
        let (router, _) = router(|| Err(OracleError::Unrecognized("blorp".into())));
        let mut ctx = ExecutionContext::default();
        let decision = router
            .route(&mut ctx, &mut Vec::new(), Some(("blorp", &SceneSummary::default())))
            .await
            .unwrap();
        assert!(matches!(decision, RouteDecision::Reject(msg) if msg.contains("blorp")));
    }
}
