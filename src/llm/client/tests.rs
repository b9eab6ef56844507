use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::deep_research::{JobBackend, JobHandle, JobStatus, RecordingSleeper};
use super::{LlmGateway, LlmPurpose, LlmRequest, RigBackend, classify_backend_error};
use crate::config::LLMConfig;
use crate::error::{HorizonError, HorizonResult};
use crate::testing::ScriptedLlm;
use crate::types::category::SteepvCategory;
use crate::types::research::ExtractedEntities;
use crate::types::signal::SearchHit;

struct NeverFinishingJob;

#[async_trait]
impl JobBackend for NeverFinishingJob {
    async fn submit(&self, _request: &LlmRequest) -> HorizonResult<JobHandle> {
        Ok(JobHandle { id: "job".into() })
    }

    async fn poll(&self, _handle: &JobHandle) -> HorizonResult<JobStatus> {
        Ok(JobStatus::Pending)
    }
}

fn gateway(
    llm: Arc<ScriptedLlm>,
    jobs: Option<Arc<dyn JobBackend>>,
) -> (LlmGateway, RecordingSleeper) {
    let sleeper = RecordingSleeper::new();
    let mut config = LLMConfig::default();
    config.retry_attempts = 3;
    config.retry_delay_ms = 1000;
    config.deep_research.max_poll_cycles = 4;
    let gateway = LlmGateway::with_backends(
        config,
        llm,
        jobs,
        Arc::new(sleeper.clone()),
        CancellationToken::new(),
    );
    (gateway, sleeper)
}

fn entities() -> ExtractedEntities {
    ExtractedEntities {
        topics: vec!["Qubits".into(), "Error correction".into()],
        concepts: vec!["Superposition".into()],
        entities: vec!["IBM".into()],
    }
}

fn hit() -> SearchHit {
    SearchHit {
        title: "New qubit record".into(),
        url: "https://example.com/qubits".into(),
        snippet: "Researchers report...".into(),
    }
}

#[tokio::test]
async fn test_parse_repairs_once_with_diagnostic() {
    let llm = ScriptedLlm::queued(vec![
        Ok("I think the topics are qubits".into()),
        Ok("```json\n{\"topics\": [\"Qubits\"], \"concepts\": [\"Decoherence\"]}\n```".into()),
    ]);
    let (gateway, _) = gateway(llm.clone(), None);

    let parsed = gateway
        .parse_to_entities("Quantum Computing", "# Report")
        .await
        .unwrap();
    assert_eq!(parsed.topics, vec!["Qubits"]);
    assert_eq!(parsed.concepts, vec!["Decoherence"]);

    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].system.contains("JSON schema"));
    assert!(!requests[0].user.contains("failed validation"));
    assert!(requests[1].user.contains("failed validation"));
    assert_eq!(requests[1].purpose, LlmPurpose::ParseEntities);
}

#[tokio::test]
async fn test_parse_fails_with_schema_error_after_repair() {
    let llm = ScriptedLlm::queued(vec![
        Ok("{\"concepts\": []}".into()),
        Ok("{\"topics\": []}".into()),
    ]);
    let (gateway, _) = gateway(llm.clone(), None);

    let err = gateway
        .parse_to_entities("Quantum Computing", "# Report")
        .await
        .unwrap_err();
    match err {
        HorizonError::Schema { target, diagnostic } => {
            assert_eq!(target, "ExtractedEntities");
            assert!(diagnostic.contains("topics"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(llm.requests().len(), 2);
}

#[tokio::test]
async fn test_domain_map_transport_exhaustion_is_llm_call_error() {
    let llm = ScriptedLlm::queued(vec![
        Err(HorizonError::Transport("reset".into())),
        Err(HorizonError::Transport("reset".into())),
        Err(HorizonError::Transport("reset".into())),
    ]);
    let (gateway, sleeper) = gateway(llm.clone(), None);

    let err = gateway
        .generate_domain_map(SteepvCategory::Economic, &entities())
        .await
        .unwrap_err();
    assert!(matches!(err, HorizonError::LlmCall { attempts: 3, .. }));
    assert_eq!(
        sleeper.recorded(),
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );
}

#[tokio::test]
async fn test_domain_map_falls_back_after_invalid_replies() {
    let llm = ScriptedLlm::queued(vec![Ok("nope".into()), Ok("{\"core\": []}".into())]);
    let (gateway, _) = gateway(llm, None);

    let outcome = gateway
        .generate_domain_map(SteepvCategory::Political, &entities())
        .await
        .unwrap();
    assert!(outcome.fallback_reason.is_some());
    assert_eq!(outcome.map.category, SteepvCategory::Political);
    assert_eq!(outcome.map.core, vec!["Qubits"]);
    assert_eq!(outcome.map.adjacent, vec!["Error correction"]);
    assert_eq!(outcome.map.peripheral, vec!["Qubits"]);
}

#[tokio::test]
async fn test_domain_map_auth_error_is_not_retried() {
    let llm = ScriptedLlm::queued(vec![Err(HorizonError::Auth("401".into()))]);
    let (gateway, sleeper) = gateway(llm.clone(), None);

    let err = gateway
        .generate_domain_map(SteepvCategory::Social, &entities())
        .await
        .unwrap_err();
    assert!(matches!(err, HorizonError::Auth(_)));
    assert_eq!(llm.requests().len(), 1);
    assert!(sleeper.recorded().is_empty());
}

#[tokio::test]
async fn test_domain_map_normalizes_valid_reply() {
    let llm = ScriptedLlm::queued(vec![Ok(
        "{\"core\": [\"Quantum sensing\"], \"adjacent\": [\"quantum sensing\", \"Cryogenics\"], \"peripheral\": [\"Export controls\"]}".into(),
    )]);
    let (gateway, _) = gateway(llm, None);

    let outcome = gateway
        .generate_domain_map(SteepvCategory::Technological, &entities())
        .await
        .unwrap();
    assert!(outcome.fallback_reason.is_none());
    assert_eq!(outcome.map.adjacent, vec!["Cryogenics"]);
    assert_eq!(outcome.map.sub_topic_count(), 3);
}

#[tokio::test]
async fn test_score_relevance_drops_malformed_and_rejected_replies() {
    let llm = ScriptedLlm::queued(vec![
        Ok("not json at all".into()),
        Ok("".into()),
        Ok("{\"relevant\": false, \"description\": \"x\"}".into()),
        Ok("{\"relevant\": true, \"description\": \"  Record coherence time. \", \"relevance\": \"Shows progress\"}".into()),
    ]);
    let (gateway, _) = gateway(llm, None);

    for _ in 0..3 {
        let verdict = gateway
            .score_relevance("Quantum Computing", SteepvCategory::Technological, &hit())
            .await
            .unwrap();
        assert!(verdict.is_none());
    }

    let accepted = gateway
        .score_relevance("Quantum Computing", SteepvCategory::Technological, &hit())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(accepted.description, "Record coherence time.");
    assert_eq!(accepted.relevance, "Shows progress");
}

#[tokio::test]
async fn test_direct_long_document_uses_deep_research_model() {
    let llm = ScriptedLlm::queued(vec![Ok("# Quantum report".into())]);
    let (gateway, _) = gateway(llm.clone(), None);

    let text = gateway
        .generate_long_document("Quantum Computing")
        .await
        .unwrap();
    assert_eq!(text, "# Quantum report");

    let requests = llm.requests();
    assert_eq!(requests[0].purpose, LlmPurpose::DeepResearch);
    assert_eq!(requests[0].model, LLMConfig::default().model_deep_research);
}

#[tokio::test]
async fn test_empty_long_document_is_rejected() {
    let llm = ScriptedLlm::queued(vec![Ok("   ".into())]);
    let (gateway, _) = gateway(llm, None);

    let err = gateway.generate_long_document("Topic").await.unwrap_err();
    assert!(matches!(err, HorizonError::LlmCall { .. }));
}

#[tokio::test]
async fn test_background_long_document_times_out() {
    let llm = ScriptedLlm::queued(vec![]);
    let (gateway, sleeper) = gateway(llm.clone(), Some(Arc::new(NeverFinishingJob)));

    let err = gateway.generate_long_document("Topic").await.unwrap_err();
    assert!(matches!(err, HorizonError::Timeout { cycles: 4, .. }));
    assert_eq!(sleeper.recorded().len(), 4);
    assert!(llm.requests().is_empty());
}

#[tokio::test]
async fn test_cancelled_gateway_makes_no_calls() {
    let llm = ScriptedLlm::queued(vec![Ok("{}".into())]);
    let cancel = CancellationToken::new();
    let gateway = LlmGateway::with_backends(
        LLMConfig::default(),
        llm.clone(),
        None,
        Arc::new(RecordingSleeper::new()),
        cancel.clone(),
    );
    cancel.cancel();

    let err = gateway
        .generate_domain_map(SteepvCategory::Values, &entities())
        .await
        .unwrap_err();
    assert!(matches!(err, HorizonError::Cancelled));
    assert!(llm.requests().is_empty());
}

#[tokio::test]
async fn test_scenario_scoring_parses_sheet() {
    let llm = ScriptedLlm::queued(vec![Ok(
        "{\"scores\": [{\"title\": \"Quantum winter\", \"novelty\": 3, \"plausibility\": 4, \"impact\": 5, \"clarity\": 4, \"uncertainty_coverage\": 3, \"explanation\": \"ok\"}]}".into(),
    )]);
    let (gateway, _) = gateway(llm, None);

    let drafts = vec![crate::types::scenario::ScenarioDraft {
        title: "Quantum winter".into(),
        body: "Funding dries up".into(),
    }];
    let scores = gateway
        .score_scenarios("Quantum Computing", &drafts)
        .await
        .unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].impact, 5);
    assert!(scores[0].overall_score.is_none());
}

#[test]
fn test_rig_backend_builds_for_every_provider() {
    for provider in ["openai", "deepseek", "anthropic", "ollama"] {
        let config = LLMConfig {
            provider: provider.parse().unwrap(),
            api_key: "sk-test".into(),
            ..Default::default()
        };
        assert!(RigBackend::new(&config).is_ok(), "provider {}", provider);
    }
}

#[test]
fn test_backend_errors_split_auth_from_transport() {
    let auth = classify_backend_error(&anyhow::anyhow!("HTTP 401: Invalid API key"));
    assert!(matches!(auth, HorizonError::Auth(_)));

    let transport = classify_backend_error(&anyhow::anyhow!("connection reset by peer"));
    assert!(matches!(transport, HorizonError::Transport(_)));
}
