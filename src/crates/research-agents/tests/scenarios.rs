//! End-to-end scenario tests driving a full turn through the compiled
//! graph against the in-memory fakes with a `ScriptedModel`, so every
//! result is deterministic and network-free.

use llm::scripted::ScriptedModel;
use research_agents::agents::Deps;
use research_agents::cache::AnswerCache;
use research_agents::config::Config;
use research_agents::fingerprint;
use research_agents::memory::ConversationMemory;
use research_agents::providers::fake::{FakeGraphStore, FakeWebSearch, NoopReranker, SeedChunk};
use research_agents::state::{TriageClass, WorkflowStatus};
use research_agents::workflow::{self, deps_for_turn, is_cached, run_turn};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;

fn template_deps(model: ScriptedModel, store: FakeGraphStore, web: Vec<research_agents::model::RetrievedChunk>) -> Deps {
    Deps {
        llm: Arc::new(model),
        graph_store: Arc::new(store),
        web_search: Arc::new(FakeWebSearch::new(web)),
        reranker: Arc::new(NoopReranker),
        cache: AnswerCache::new(chrono::Duration::days(30), StdDuration::from_secs(5)),
        memory: ConversationMemory::new(),
        config: Arc::new(Config::default()),
        pending_build: Arc::new(Mutex::new(None)),
    }
}

/// Scenario 1: a cold cache builds a full answer and admits it; a
/// case/whitespace-different repeat of the same question hits the warm
/// cache and bumps `usage_count` without calling the LLM for synthesis.
#[tokio::test]
async fn scenario_1_cache_cold_then_warm() {
    let compiled = workflow::build().unwrap();
    let store = FakeGraphStore::new().seed(SeedChunk {
        uid: "1607".into(),
        title: Some("Section 1607".into()),
        text: "Section 1607 establishes minimum uniformly distributed live loads by occupancy."
            .into(),
    });
    let long_answer = format!(
        "Section 1607 establishes the minimum uniformly distributed live loads for each \
         occupancy category and the rules for reducing them based on tributary area. {}[1607].",
        "Supporting detail. ".repeat(20)
    );
    let model = ScriptedModel::new(r#"{"score": 9, "reasoning": "on point"}"#)
        .on("Compose the final answer", &long_answer)
        .on(
            "Summarize this conversation",
            r#"{"user_goals": [], "key_facts": [], "unresolved_questions": []}"#,
        );
    let template = template_deps(model, store, vec![]);

    let cold_deps = deps_for_turn(&template);
    let cold_start = tokio::time::Instant::now();
    let cold_state = run_turn(
        &compiled,
        "What is Section 1607 about?".into(),
        "s1".into(),
        cold_deps.clone(),
    )
    .await
    .unwrap();
    let cold_elapsed = cold_start.elapsed();

    assert_eq!(cold_state.workflow_status, WorkflowStatus::Completed);
    assert!(cold_state.final_answer.as_deref().unwrap().contains("1607"));
    assert!(!cold_state.served_from_cache);

    let fp = fingerprint::fingerprint("what is section 1607 about?");
    assert!(is_cached(&cold_deps, &fp).await);

    let warm_deps = deps_for_turn(&template);
    let warm_start = tokio::time::Instant::now();
    let warm_state = run_turn(
        &compiled,
        "what is section 1607 about?".into(),
        "s2".into(),
        warm_deps,
    )
    .await
    .unwrap();
    let warm_elapsed = warm_start.elapsed();

    assert_eq!(warm_state.triage_class, Some(TriageClass::Simple));
    assert!(warm_state.served_from_cache);
    assert_eq!(warm_state.workflow_status, WorkflowStatus::Completed);

    let stats = template.cache.stats().await;
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.avg_usage, 1.0);
    // The warm path skips planning, hyde, and research entirely, so it
    // should never be slower than the cold build that ran all of them.
    assert!(warm_elapsed <= cold_elapsed + StdDuration::from_millis(50));
}

/// Scenario 2: an explicit table reference takes the direct-retrieval fast
/// path, skips planning, and the synthesized answer cites the table uid.
#[tokio::test]
async fn scenario_2_direct_retrieval() {
    let compiled = workflow::build().unwrap();
    let store = FakeGraphStore::new().seed(SeedChunk {
        uid: "1607.9.1".into(),
        title: Some("Table 1607.9.1".into()),
        text: "Live load reduction factors for members supporting large tributary areas.".into(),
    });
    let model = ScriptedModel::new(r#"{"score": 9, "reasoning": "exact match"}"#)
        .on("Compose the final answer", "Table 1607.9.1 lists the live load reduction factors [1607.9.1].");
    let deps = deps_for_turn(&template_deps(model, store, vec![]));

    let final_state = run_turn(&compiled, "Show me Table 1607.9.1".into(), "s1".into(), deps)
        .await
        .unwrap();

    assert_eq!(final_state.triage_class, Some(TriageClass::DirectRetrieval));
    assert!(final_state.plan.is_none());
    assert_eq!(final_state.workflow_status, WorkflowStatus::Completed);
    let sub_queries = final_state.sub_query_answers.unwrap();
    assert_eq!(sub_queries.len(), 1);
    assert_eq!(
        sub_queries[0].strategy,
        Some(research_agents::model::Strategy::Direct)
    );
    assert!(final_state.final_answer.unwrap().contains("1607.9.1"));
}

/// Scenario 3: a calculation question selects Planning's specialist mode
/// (>=5 granular steps), retrieves across the governing equation and its
/// inferred sibling sections, and synthesizes a cited numeric result.
#[tokio::test]
async fn scenario_3_calculation_path() {
    let compiled = workflow::build().unwrap();
    let store = FakeGraphStore::new()
        .seed(SeedChunk {
            uid: "1607".into(),
            title: Some("Section 1607".into()),
            text: "Chapter 16 live load provisions.".into(),
        })
        .seed(SeedChunk {
            uid: "1607.9.1".into(),
            title: Some("Table 1607.9.1".into()),
            text: "KLL live load element factor by structural member type.".into(),
        })
        .seed(SeedChunk {
            uid: "1607.12".into(),
            title: Some("Section 1607.12".into()),
            text: "Equation 16-7 computes the reduced live load from L0, KLL, and tributary area, \
                   subject to the minimum limits in this section."
                .into(),
        });

    let plan_json = r#"{"reasoning":"r","classification":"engage","plan":[
        {"sub_query":"What formula governs live load reduction under Equation 16-7?","hint":"Equation 16-7"},
        {"sub_query":"What does the variable KLL represent in Equation 16-7?","hint":"Equation 16-7"},
        {"sub_query":"What is the live load reduction table value for a 500 sq ft tributary area?","hint":"Table 1607.9.1"},
        {"sub_query":"What is the given base live load L0 of 50 psf?","hint":"Section 1607"},
        {"sub_query":"Compute the reduced live load using the governing formula.","hint":"Section 1607.12"},
        {"sub_query":"Validate the computed reduced live load against the code limits.","hint":"Section 1607.12"}
    ]}"#;
    let synthesis_answer = format!(
        "Using Equation 16-7 with L0 = 50 psf and the KLL factor from Table 1607.9.1 for a \
         500 sq ft tributary area, the reduced live load works out to approximately 30.5 psf, \
         which satisfies the minimum limits in Section 1607.12 [1607.12]. {}",
        "Supporting calculation detail. ".repeat(20)
    );
    let model = ScriptedModel::new(r#"{"score": 9, "reasoning": "on point"}"#)
        .on("Classify this question", r#"{"class": "engage", "confidence": 0.9, "reason": "calculation"}"#)
        .on("Decompose this question", plan_json)
        .on("Compose the final answer", &synthesis_answer)
        .on(
            "Summarize this conversation",
            r#"{"user_goals": [], "key_facts": [], "unresolved_questions": []}"#,
        );
    let deps = deps_for_turn(&template_deps(model, store, vec![]));

    let final_state = run_turn(
        &compiled,
        "Calculate the reduced live load for tributary area 500 sq ft, L0=50 psf, using Equation 16-7"
            .into(),
        "s1".into(),
        deps,
    )
    .await
    .unwrap();

    assert_eq!(final_state.workflow_status, WorkflowStatus::Completed);
    let plan = final_state.plan.as_ref().unwrap();
    assert_eq!(plan.mode, research_agents::model::PlanMode::Specialist);
    assert!(plan.sub_queries.len() >= 5);
    let answer = final_state.final_answer.unwrap();
    assert!(answer.contains("1607.12"));
    assert!(answer.to_lowercase().contains("psf"));
}

/// Scenario 4: the primary strategy and its first fallbacks miss (nothing
/// in the graph store), so the chain reaches `web`, validates, and
/// synthesis proceeds on a low-confidence answer that cache admission
/// correctly skips.
#[tokio::test]
async fn scenario_4_fallback_to_web() {
    let compiled = workflow::build().unwrap();
    let store = FakeGraphStore::new();
    let web_hit = research_agents::model::RetrievedChunk {
        uid: "web-1".into(),
        source_tag: research_agents::model::SourceTag::Web,
        title: None,
        text: "A community forum post discussing seismic bracing for rooftop equipment.".into(),
        score: Some(1.0),
        metadata: serde_json::Value::Null,
    };
    let short_answer = "Rooftop equipment bracing isn't covered in the indexed corpus; a forum \
                         post suggests checking the equipment manufacturer's seismic anchorage \
                         guidance [web-1]."
        .to_string();
    let model = ScriptedModel::new(r#"{"score": 9, "reasoning": "web result is on point"}"#)
        .on("Classify this question", r#"{"class": "engage", "confidence": 0.6, "reason": "needs research"}"#)
        .on(
            "Decompose this question",
            r#"{"reasoning":"r","classification":"engage","plan":[{"sub_query":"How should rooftop equipment be seismically braced?"}]}"#,
        )
        .on("Write a short hypothetical passage", "Rooftop equipment seismic bracing guidance.")
        .on("Compose the final answer", &short_answer)
        .on(
            "Summarize this conversation",
            r#"{"user_goals": [], "key_facts": [], "unresolved_questions": []}"#,
        );
    let deps = deps_for_turn(&template_deps(model, store, vec![web_hit]));

    let final_state = run_turn(
        &compiled,
        "How should rooftop equipment be seismically braced?".into(),
        "s1".into(),
        deps.clone(),
    )
    .await
    .unwrap();

    assert_eq!(final_state.workflow_status, WorkflowStatus::Completed);
    let sub_queries = final_state.sub_query_answers.unwrap();
    assert_eq!(
        sub_queries[0].strategy,
        Some(research_agents::model::Strategy::Web)
    );
    assert!(sub_queries[0].used_fallback());
    assert!(final_state.confidence.unwrap() < Config::default().quality_min_confidence);

    let fp = fingerprint::fingerprint("How should rooftop equipment be seismically braced?");
    assert!(!is_cached(&deps, &fp).await);
}

/// Scenario 5: a follow-up question in an existing session is classified
/// `contextual` and answered from `context_payload` alone, without
/// building a fresh plan.
#[tokio::test]
async fn scenario_5_follow_up_uses_context() {
    let compiled = workflow::build().unwrap();
    let store = FakeGraphStore::new().seed(SeedChunk {
        uid: "1607".into(),
        title: Some("Section 1607".into()),
        text: "Section 1607 covers live loads.".into(),
    });
    let priming_answer = format!(
        "Section 1607 covers live loads and their reduction for large tributary areas [1607]. {}",
        "Supporting detail. ".repeat(20)
    );
    let model = ScriptedModel::new(r#"{"score": 9, "reasoning": "on point"}"#)
        .on("Compose the final answer", &priming_answer)
        .on(
            "Summarize this conversation",
            r#"{"user_goals": ["understand Section 1607"], "key_facts": ["live loads reduce with tributary area"], "unresolved_questions": []}"#,
        )
        .on("Classify this question", r#"{"class": "contextual", "confidence": 0.8, "reason": "follow-up"}"#)
        .on("Follow-up question", "Subsection .12 covers the KLL live load element factor limits [1607.12].");
    let template = template_deps(model, store, vec![]);

    let priming_deps = deps_for_turn(&template);
    let priming_state = run_turn(
        &compiled,
        "What is Section 1607 about?".into(),
        "s1".into(),
        priming_deps,
    )
    .await
    .unwrap();
    assert_eq!(priming_state.workflow_status, WorkflowStatus::Completed);

    let follow_up_deps = deps_for_turn(&template);
    let final_state = run_turn(
        &compiled,
        "What about subsection .12?".into(),
        "s1".into(),
        follow_up_deps,
    )
    .await
    .unwrap();

    assert_eq!(final_state.triage_class, Some(TriageClass::Contextual));
    assert!(final_state.plan.is_none());
    assert_eq!(final_state.workflow_status, WorkflowStatus::Completed);
    assert!(final_state.final_answer.unwrap().contains("1607.12"));
}

/// Scenario 6: an off-topic question is rejected with a canned terminal
/// message; no retrieval and no cache write occur.
#[tokio::test]
async fn scenario_6_rejection() {
    let compiled = workflow::build().unwrap();
    let deps = deps_for_turn(&template_deps(
        ScriptedModel::new(r#"{"class": "reject", "confidence": 0.95, "reason": "off-topic"}"#),
        FakeGraphStore::new(),
        vec![],
    ));

    let final_state = run_turn(
        &compiled,
        "Best chocolate chip cookie recipe?".into(),
        "s1".into(),
        deps.clone(),
    )
    .await
    .unwrap();

    assert_eq!(final_state.triage_class, Some(TriageClass::Reject));
    assert_eq!(final_state.workflow_status, WorkflowStatus::Completed);
    assert!(final_state.final_answer.is_some());
    assert!(final_state.plan.is_none());

    let fp = fingerprint::fingerprint("Best chocolate chip cookie recipe?");
    assert!(!is_cached(&deps, &fp).await);
}
