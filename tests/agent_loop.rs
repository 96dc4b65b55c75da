//! Gathering loop and full question cycle against a scripted provider.

#![cfg(feature = "agent")]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use citeqa::agent::{ChatResponse, Gatherer, Orchestrator, PromptSet, StopReason};
use citeqa::core::StreamEvent;
use citeqa::corpus::DocumentStore;
use citeqa::error::{AgentError, Error};
use common::{Role, ScriptedProvider, config, papers, role, tool_call};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn single_iteration_without_tools_falls_back_to_keywords() {
    let provider = Arc::new(ScriptedProvider::new(|request| match role(request) {
        Role::Keywords => Ok(ChatResponse::text(r#"{"keywords": ["gated memory", "GPUs"]}"#)),
        _ => Ok(ChatResponse::text("I have no idea which tool to use.")),
    }));
    let config = config()
        .max_iterations(1)
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"));
    let gatherer = Gatherer::new(provider.clone(), &config, &PromptSet::defaults());
    let store = papers();
    let index = store.index().unwrap_or_else(|e| panic!("index: {e}"));

    let outcome = gatherer
        .gather(&store, "How long did training take?", &index, &CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("gather: {e}"));

    assert_eq!(outcome.stop_reason, StopReason::NoToolCalls);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(
        outcome.fallback_keywords,
        Some(vec!["gated memory".to_string(), "GPUs".to_string()])
    );
    assert_eq!(provider.calls(Role::Gather), 1);
    assert_eq!(provider.calls(Role::Keywords), 1);

    let lstm = outcome
        .evidence
        .get("lstm")
        .unwrap_or_else(|| panic!("lstm evidence missing"));
    assert_eq!(lstm.snippets, vec!["LSTM adds gated memory cells."]);
    assert_eq!(lstm.line_numbers, vec![Some(2)]);
    let attention = outcome
        .evidence
        .get("attention")
        .unwrap_or_else(|| panic!("attention evidence missing"));
    assert_eq!(attention.line_numbers, vec![Some(4)]);
}

#[tokio::test]
async fn repeated_calls_execute_once() {
    let provider = Arc::new(ScriptedProvider::new(|request| {
        if role(request) != Role::Gather {
            return Ok(ChatResponse::default());
        }
        Ok(ChatResponse::with_tool_calls(vec![
            tool_call("search_file", json!({"document_id": "attention", "pattern": "attention"})),
            tool_call("search_file", json!({"pattern": "attention", "document_id": "attention"})),
            tool_call("read_abstract", json!({"document_id": "attention"})),
        ]))
    }));
    let config = config()
        .max_iterations(3)
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"));
    let gatherer = Gatherer::new(provider.clone(), &config, &PromptSet::defaults());
    let store = papers();
    let index = store.index().unwrap_or_else(|e| panic!("index: {e}"));

    let outcome = gatherer
        .gather(&store, "What is self-attention?", &index, &CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("gather: {e}"));

    assert_eq!(outcome.evidence.issued().len(), 2);
    assert_eq!(outcome.duplicates_skipped, 1 + 3 + 3);
    assert_eq!(outcome.stop_reason, StopReason::MaxIterations);
    assert!(outcome.fallback_keywords.is_none());

    // The history shown to the model lists each distinct call once.
    let last_gather = provider
        .requests()
        .into_iter()
        .filter(|r| role(r) == Role::Gather)
        .last()
        .unwrap_or_else(|| panic!("no gather request"));
    let prompt = last_gather.user_content().unwrap_or_default();
    assert_eq!(prompt.matches("<call>").count(), 2);
    assert!(prompt.contains("<iteration>3 of 3</iteration>"));
}

#[tokio::test]
async fn tool_errors_do_not_abort_gathering() {
    let provider = Arc::new(ScriptedProvider::new(|request| {
        if request.user_content().is_some_and(|u| u.contains("(no tool calls yet)")) {
            return Ok(ChatResponse::with_tool_calls(vec![
                tool_call("read_file", json!({"document_id": "missing"})),
                tool_call("search_file", json!({"document_id": "lstm", "pattern": "("})),
                tool_call("teleport", json!({})),
                tool_call("view_file", json!({"document_id": "lstm", "start": 1, "end": 3})),
            ]));
        }
        Ok(ChatResponse::with_tool_calls(vec![tool_call("stop", json!({}))]))
    }));
    let config = config()
        .max_iterations(5)
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"));
    let gatherer = Gatherer::new(provider, &config, &PromptSet::defaults());
    let store = papers();
    let index = store.index().unwrap_or_else(|e| panic!("index: {e}"));

    let outcome = gatherer
        .gather(&store, "q", &index, &CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("gather: {e}"));

    assert_eq!(outcome.stop_reason, StopReason::StopTool);
    assert_eq!(outcome.iterations, 2);
    let errors: Vec<_> = outcome
        .evidence
        .issued()
        .iter()
        .filter(|r| r.result.is_error())
        .collect();
    assert_eq!(errors.len(), 3);
    assert_eq!(outcome.evidence.document_ids(), vec!["lstm"]);
}

#[tokio::test]
async fn large_history_is_condensed_before_next_iteration() {
    let iteration = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&iteration);
    let provider = Arc::new(ScriptedProvider::new(move |request| match role(request) {
        Role::History => Ok(ChatResponse::text(r#"{"0": "LSTM: gated memory cells."}"#)),
        Role::Gather => {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(ChatResponse::with_tool_calls(vec![tool_call(
                    "read_file",
                    json!({"document_id": "lstm"}),
                )]))
            } else {
                Ok(ChatResponse::default())
            }
        }
        _ => Ok(ChatResponse::default()),
    }));
    let config = config()
        .max_iterations(3)
        .tool_result_threshold(20)
        .chat_threshold(100_000)
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"));
    let gatherer = Gatherer::new(provider.clone(), &config, &PromptSet::defaults());
    let store = papers();
    let index = store.index().unwrap_or_else(|e| panic!("index: {e}"));

    let outcome = gatherer
        .gather(&store, "q", &index, &CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("gather: {e}"));

    assert_eq!(provider.calls(Role::History), 1);
    assert_eq!(outcome.history_compactions.len(), 1);
    assert_eq!(outcome.history_compactions[0].condensed, 1);
    assert_eq!(
        outcome.evidence.issued()[0].result.render(),
        "LSTM: gated memory cells."
    );
    // Evidence itself is untouched by history compaction.
    let lstm = outcome
        .evidence
        .get("lstm")
        .unwrap_or_else(|| panic!("lstm evidence missing"));
    assert!(lstm.snippets[0].contains("Recurrent networks"));
}

#[tokio::test]
async fn ask_streams_content_then_one_citation_payload() {
    let provider = Arc::new(
        ScriptedProvider::new(|request| {
            if role(request) == Role::Gather
                && request.user_content().is_some_and(|u| u.contains("(no tool calls yet)"))
            {
                return Ok(ChatResponse::with_tool_calls(vec![tool_call(
                    "search_all_files",
                    json!({"query": "eight GPUs"}),
                )]));
            }
            Ok(ChatResponse::default())
        })
        .streaming([
            "Training took 3.5 days @cite[1].",
            "\n---EVIDENCE",
            "---\n@cite[1|attention]\n\"Training took 3.5 days on eight GPUs.\"\n@cite[2]\n\"unscoped\"\n---END-EVI",
            "DENCE---\n",
        ]),
    );
    let config = config()
        .max_iterations(2)
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"));
    let orchestrator = Orchestrator::new(provider.clone(), config).with_prompts(PromptSet::defaults());
    let mut events = Vec::new();

    let result = orchestrator
        .ask(
            &papers(),
            "How long did training take?",
            &["Reported in section 5.".to_string()],
            &CancellationToken::new(),
            |event| events.push(event.clone()),
        )
        .await
        .unwrap_or_else(|e| panic!("ask: {e}"));

    assert_eq!(result.answer, "Training took 3.5 days @cite[1].\n");
    assert_eq!(result.citations.len(), 1);
    assert_eq!(result.citations[0].document_id.as_deref(), Some("attention"));
    assert_eq!(result.documents_consulted, vec!["attention"]);

    let content: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Content(text) => Some(text.as_str()),
            StreamEvent::Citations(_) => None,
        })
        .collect();
    assert_eq!(content, result.answer);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Citations(_)))
            .count(),
        1
    );

    let answer_request = provider
        .requests()
        .into_iter()
        .find(|r| role(r) == Role::Answer)
        .unwrap_or_else(|| panic!("no answer request"));
    let prompt = answer_request.user_content().unwrap_or_default();
    assert!(prompt.contains("<references>"));
    assert!(prompt.contains("@cite[1]\n\"Reported in section 5.\""));
}

#[tokio::test]
async fn cancellation_before_answer_is_reported() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let provider = Arc::new(ScriptedProvider::new(move |_| {
        trigger.cancel();
        Ok(ChatResponse::with_tool_calls(vec![tool_call(
            "read_abstract",
            json!({"document_id": "attention"}),
        )]))
    }));
    let config = config()
        .max_iterations(4)
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"));
    let orchestrator = Orchestrator::new(provider.clone(), config).with_prompts(PromptSet::defaults());

    let result = orchestrator
        .ask(&papers(), "q", &[], &cancel, |_| {})
        .await;

    assert!(matches!(result, Err(Error::Agent(AgentError::Cancelled))));
    assert_eq!(provider.calls(Role::Gather), 1);
    assert_eq!(provider.calls(Role::Answer), 0);
}

#[tokio::test]
async fn evidence_over_chat_threshold_is_compacted() {
    let provider = Arc::new(ScriptedProvider::new(|request| match role(request) {
        Role::Gather => Ok(ChatResponse::with_tool_calls(vec![tool_call(
            "read_file",
            json!({"document_id": "lstm"}),
        )])),
        _ => Ok(ChatResponse::text("{}")),
    }));
    let config = config()
        .max_iterations(1)
        .tool_result_threshold(1)
        .chat_threshold(2)
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"));
    let gatherer = Gatherer::new(provider.clone(), &config, &PromptSet::defaults());
    let store = papers();
    let index = store.index().unwrap_or_else(|e| panic!("index: {e}"));

    let outcome = gatherer
        .gather(&store, "q", &index, &CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("gather: {e}"));

    let report = outcome
        .compaction
        .unwrap_or_else(|| panic!("evidence compaction did not run"));
    assert_eq!(report.kept, 1);
    assert_eq!(report.failed_batches, 0);
    assert!(provider.calls(Role::FilterShort) + provider.calls(Role::FilterLong) >= 1);
    assert_eq!(provider.calls(Role::History), 0);
    assert_eq!(outcome.evidence.snippet_count(), 1);
}

#[tokio::test]
async fn small_evidence_is_never_compacted() {
    let provider = Arc::new(ScriptedProvider::new(|request| {
        if request.user_content().is_some_and(|u| u.contains("(no tool calls yet)")) {
            return Ok(ChatResponse::with_tool_calls(vec![
                tool_call("read_abstract", json!({"document_id": "attention"})),
                tool_call("search_file", json!({"document_id": "lstm", "pattern": "memory"})),
            ]));
        }
        Ok(ChatResponse::with_tool_calls(vec![tool_call("stop", json!({}))]))
    }));
    let config = config()
        .max_iterations(4)
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"));
    let gatherer = Gatherer::new(provider.clone(), &config, &PromptSet::defaults());
    let store = papers();
    let index = store.index().unwrap_or_else(|e| panic!("index: {e}"));

    let outcome = gatherer
        .gather(&store, "q", &index, &CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("gather: {e}"));

    assert_eq!(outcome.stop_reason, StopReason::StopTool);
    assert!(!outcome.evidence.is_empty());
    assert!(outcome.compaction.is_none());
    assert!(outcome.history_compactions.is_empty());
    assert_eq!(provider.calls(Role::FilterShort), 0);
    assert_eq!(provider.calls(Role::FilterLong), 0);
    assert_eq!(provider.calls(Role::History), 0);
}

#[tokio::test]
async fn stalled_history_condensation_is_not_retried() {
    let provider = Arc::new(ScriptedProvider::new(|request| match role(request) {
        Role::History => Ok(ChatResponse::text("not json at all")),
        Role::Gather => Ok(ChatResponse::with_tool_calls(vec![tool_call(
            "read_file",
            json!({"document_id": "lstm"}),
        )])),
        _ => Ok(ChatResponse::default()),
    }));
    let config = config()
        .max_iterations(4)
        .tool_result_threshold(20)
        .chat_threshold(100_000)
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"));
    let gatherer = Gatherer::new(provider.clone(), &config, &PromptSet::defaults());
    let store = papers();
    let index = store.index().unwrap_or_else(|e| panic!("index: {e}"));

    let outcome = gatherer
        .gather(&store, "q", &index, &CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("gather: {e}"));

    // Later iterations only repeat the same call, so the history never grows.
    assert_eq!(outcome.iterations, 4);
    assert_eq!(provider.calls(Role::History), 1);
    assert_eq!(outcome.history_compactions.len(), 1);
    assert!(outcome.history_compactions[0].failed);
}
