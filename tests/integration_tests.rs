use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use horizon_scan::config::{CacheConfig, Config, LLMConfig};
use horizon_scan::generator::context::GeneratorContext;
use horizon_scan::generator::workflow::{Pipeline, TimingScope, execute_and_save};
use horizon_scan::llm::{
    JobBackend, JobHandle, JobStatus, LlmGateway, LlmPurpose, LlmRequest, RecordingSleeper,
};
use horizon_scan::search::SearchGateway;
use horizon_scan::testing::{ScriptedLlm, ScriptedSearch, canned_reply, category_of};
use horizon_scan::types::category::SteepvCategory;
use horizon_scan::types::research::DocumentSource;
use horizon_scan::types::signal::SearchHit;
use horizon_scan::{HorizonError, HorizonResult};

/// 创建指向临时目录的配置
fn test_config(dir: &Path) -> Config {
    Config {
        topic: "Quantum Computing".to_string(),
        output_path: dir.join("output"),
        cache: CacheConfig {
            enabled: true,
            cache_dir: dir.join("cache"),
        },
        ..Default::default()
    }
}

fn fast_llm_config() -> LLMConfig {
    LLMConfig {
        retry_delay_ms: 1,
        ..Default::default()
    }
}

fn context_with(
    config: Config,
    llm: Arc<ScriptedLlm>,
    jobs: Option<Arc<dyn JobBackend>>,
    search: Arc<dyn SearchGateway>,
) -> GeneratorContext {
    let cancel = CancellationToken::new();
    let mut llm_config = fast_llm_config();
    llm_config.deep_research = config.llm.deep_research.clone();
    let gateway = LlmGateway::with_backends(
        llm_config,
        llm,
        jobs,
        Arc::new(RecordingSleeper::new()),
        cancel.clone(),
    );
    GeneratorContext::with_gateways(config, gateway, search, cancel)
}

fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<std::path::PathBuf> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(prefix))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// 永远不会完成的后台任务，记录轮询次数
#[derive(Default)]
struct StuckJob {
    polls: AtomicU32,
}

#[async_trait]
impl JobBackend for StuckJob {
    async fn submit(&self, _request: &LlmRequest) -> HorizonResult<JobHandle> {
        Ok(JobHandle {
            id: "resp_stuck".to_string(),
        })
    }

    async fn poll(&self, _handle: &JobHandle) -> HorizonResult<JobStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(JobStatus::Pending)
    }
}

#[tokio::test]
async fn test_end_to_end_quantum_computing() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let context = context_with(
        config,
        ScriptedLlm::canned(),
        None,
        ScriptedSearch::one_hit_per_query(),
    );

    let mut timing = TimingScope::new();
    let (output, saved) = execute_and_save(&context, &mut timing).await.unwrap();

    let output_dir = temp_dir.path().join("output");
    assert_eq!(files_with_prefix(&output_dir, "dr_").len(), 1);
    assert_eq!(saved.research_document, files_with_prefix(&output_dir, "dr_").pop());

    let parsed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&saved.parsed_entities).unwrap()).unwrap();
    assert!(!parsed["topics"].as_array().unwrap().is_empty());

    let results_dir = output_dir.join("results");
    let result_files = files_with_prefix(&results_dir, "horizon_scan_results_");
    assert_eq!(result_files.len(), 1);
    let results: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&result_files[0]).unwrap()).unwrap();
    let signals = results["signals"].as_object().unwrap();
    assert_eq!(signals.len(), 6);
    for category in SteepvCategory::ALL {
        assert!(signals[category.as_str()].is_array());
    }
    assert_eq!(results["topic"], "Quantum Computing");
    assert_eq!(results["summary"]["total_signals"], 18);
    assert_eq!(results["scenarios"].as_array().unwrap().len(), 2);
    assert_eq!(output.result.total_signals(), 18);
}

#[tokio::test]
async fn test_second_run_hits_cache() {
    let temp_dir = TempDir::new().unwrap();

    let first_llm = ScriptedLlm::canned();
    let first = Pipeline::new(context_with(
        test_config(temp_dir.path()),
        first_llm.clone(),
        None,
        ScriptedSearch::one_hit_per_query(),
    ))
    .run()
    .await
    .unwrap();
    assert_eq!(first_llm.count(LlmPurpose::DeepResearch), 1);
    assert_eq!(first_llm.count(LlmPurpose::ParseEntities), 1);

    let second_llm = ScriptedLlm::canned();
    let second = Pipeline::new(context_with(
        test_config(temp_dir.path()),
        second_llm.clone(),
        None,
        ScriptedSearch::one_hit_per_query(),
    ))
    .run()
    .await
    .unwrap();

    assert_eq!(second.document_source, DocumentSource::Cache);
    assert_eq!(second.document, first.document);
    assert_eq!(second.document.content_hash(), first.document.content_hash());
    assert_eq!(second.entities, first.entities);
    assert_eq!(second_llm.count(LlmPurpose::DeepResearch), 0);
    assert_eq!(second_llm.count(LlmPurpose::ParseEntities), 0);
}

#[tokio::test]
async fn test_force_refresh_regenerates_and_overwrites() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.skip_web_search = true;
    config.no_scenario_scoring = true;

    Pipeline::new(context_with(
        config.clone(),
        ScriptedLlm::canned(),
        None,
        ScriptedSearch::one_hit_per_query(),
    ))
    .run()
    .await
    .unwrap();

    let refreshed_llm = ScriptedLlm::new(|request| {
        if request.purpose == LlmPurpose::DeepResearch {
            return Ok("# Quantum Computing\n\n## Refreshed findings\nNew material.".to_string());
        }
        canned_reply(request)
    });
    let mut forced = config.clone();
    forced.force_refresh = true;
    let refreshed = Pipeline::new(context_with(
        forced,
        refreshed_llm.clone(),
        None,
        ScriptedSearch::one_hit_per_query(),
    ))
    .run()
    .await
    .unwrap();
    assert_eq!(refreshed.document_source, DocumentSource::Generated);
    assert_eq!(refreshed_llm.count(LlmPurpose::DeepResearch), 1);
    assert_eq!(refreshed_llm.count(LlmPurpose::ParseEntities), 1);

    let third_llm = ScriptedLlm::canned();
    let third = Pipeline::new(context_with(
        config,
        third_llm.clone(),
        None,
        ScriptedSearch::one_hit_per_query(),
    ))
    .run()
    .await
    .unwrap();
    assert_eq!(third.document_source, DocumentSource::Cache);
    assert!(third.document.body.contains("Refreshed findings"));
    assert_eq!(third_llm.count(LlmPurpose::DeepResearch), 0);
}

#[tokio::test]
async fn test_skip_web_search_builds_maps_without_signals() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.skip_web_search = true;
    let search = ScriptedSearch::one_hit_per_query();
    let llm = ScriptedLlm::canned();

    let output = Pipeline::new(context_with(config, llm.clone(), None, search.clone()))
        .run()
        .await
        .unwrap();

    assert!(search.queries().is_empty());
    assert_eq!(llm.count(LlmPurpose::RelevanceScoring), 0);
    assert_eq!(output.result.domain_maps.len(), 6);
    for (category, map) in &output.result.domain_maps {
        assert_eq!(map.category, *category);
        assert_eq!(map.sub_topic_count(), 3);
        assert!(output.result.signals_by_category[category].is_empty());
    }
    assert!(output.result.summary.failed_categories.is_empty());
}

#[tokio::test]
async fn test_failed_agent_does_not_block_others() {
    let temp_dir = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(|request| {
        if request.purpose == LlmPurpose::DomainMap
            && category_of(request) == Some(SteepvCategory::Economic)
        {
            return Err(HorizonError::Transport("connection reset by peer".to_string()));
        }
        canned_reply(request)
    });

    let output = Pipeline::new(context_with(
        test_config(temp_dir.path()),
        llm,
        None,
        ScriptedSearch::one_hit_per_query(),
    ))
    .run()
    .await
    .unwrap();

    let signals = &output.result.signals_by_category;
    assert!(signals[&SteepvCategory::Economic].is_empty());
    assert_eq!(output.result.total_signals(), 15);
    assert_eq!(
        output.result.summary.failed_categories,
        vec![SteepvCategory::Economic]
    );
    assert!(
        output
            .result
            .warnings
            .iter()
            .any(|w| w.contains("Economic agent failed"))
    );
    for (category, list) in signals {
        assert!(list.iter().all(|signal| signal.category == *category));
    }
}

#[tokio::test]
async fn test_deep_research_poll_timeout_after_max_cycles() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.llm.deep_research.max_poll_cycles = 4;
    let jobs = Arc::new(StuckJob::default());
    let llm = ScriptedLlm::canned();

    let err = Pipeline::new(context_with(
        config,
        llm.clone(),
        Some(jobs.clone()),
        ScriptedSearch::one_hit_per_query(),
    ))
    .run()
    .await
    .unwrap_err();

    match err {
        HorizonError::Pipeline { stage, source } => {
            assert_eq!(stage, "acquire_document");
            assert!(matches!(*source, HorizonError::Timeout { cycles: 4, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(jobs.polls.load(Ordering::SeqCst), 4);
    assert_eq!(llm.count(LlmPurpose::ParseEntities), 0);
    assert!(!temp_dir.path().join("cache").join("deep_research").exists());
}

#[tokio::test]
async fn test_duplicate_urls_collapse_per_agent() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.no_scenario_scoring = true;
    let search = ScriptedSearch::new(|query| {
        Ok(vec![SearchHit {
            title: format!("Shared coverage of {}", query),
            url: "https://example.com/shared".to_string(),
            snippet: "One article everyone links to".to_string(),
        }])
    });

    let output = Pipeline::new(context_with(config, ScriptedLlm::canned(), None, search))
        .run()
        .await
        .unwrap();

    for category in SteepvCategory::ALL {
        let list = &output.result.signals_by_category[&category];
        assert_eq!(list.len(), 1, "{category} should keep one signal");
        assert_eq!(list[0].title, format!("Shared coverage of {} core", category));
    }
}

#[tokio::test]
async fn test_existing_document_without_search_or_scenarios() {
    let temp_dir = TempDir::new().unwrap();
    let document_path = temp_dir.path().join("existing.md");
    fs::write(
        &document_path,
        "# Quantum Computing\n\n## Scenario 1: Quantum Winter\nFunding dries up.\n",
    )
    .unwrap();

    let mut config = test_config(temp_dir.path());
    config.research_document = Some(document_path.clone());
    config.skip_web_search = true;
    config.no_scenario_scoring = true;
    let llm = ScriptedLlm::canned();
    let context = context_with(config, llm.clone(), None, ScriptedSearch::one_hit_per_query());

    let mut timing = TimingScope::new();
    let (output, saved) = execute_and_save(&context, &mut timing).await.unwrap();

    assert_eq!(llm.count(LlmPurpose::DeepResearch), 0);
    assert_eq!(llm.count(LlmPurpose::DomainMap), 6);
    assert_eq!(llm.count(LlmPurpose::ScenarioScoring), 0);
    assert_eq!(output.document_source, DocumentSource::File(document_path));
    assert_eq!(output.result.domain_maps.len(), 6);
    assert_eq!(output.result.total_signals(), 0);
    assert!(output.result.scenarios.is_none());

    assert!(saved.research_document.is_none());
    let results: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&saved.scan_results).unwrap()).unwrap();
    assert!(results.get("scenarios").is_none());
    assert_eq!(results["signals"].as_object().unwrap().len(), 6);
}
