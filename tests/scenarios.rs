//! End-to-end behavior of turns and the inner-life loops over a real store

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use sam_companion::context::NOTHING_YET;
use sam_companion::db::{
    MemoryCategory, MemoryRecord, Message, MessageRole, ProactiveTrigger, RUMINATION_WEIGHT,
    RecordKind, ThoughtType,
};
use sam_companion::inner_life::{
    Heartbeat, HeartbeatConfig, ReflectionService, Rumination, RuminationConfig,
};
use sam_companion::live::{ConnectionHandle, ConnectionRegistry, LiveEvent};
use sam_companion::longterm::NoopMemory;
use sam_companion::memory::{Emotion, KeywordClassifier};
use tokio::sync::mpsc;

mod common;
use common::{FailingMemory, PERSONA, ScriptedModel, chat_service, setup_store};

fn rumination_config() -> RuminationConfig {
    RuminationConfig {
        inter_session_delay: Duration::ZERO,
        ..RuminationConfig::default()
    }
}

fn heartbeat_config() -> HeartbeatConfig {
    HeartbeatConfig {
        inter_session_delay: Duration::ZERO,
        ..HeartbeatConfig::default()
    }
}

#[tokio::test]
async fn person_memory_shows_up_in_next_turn() {
    let store = setup_store();
    let model = ScriptedModel::new("oh, I'd love to hear about her");
    let chat = chat_service(&store, model.clone(), Arc::new(NoopMemory));

    chat.run_turn("s1", "my sister Mia is visiting next week").await.unwrap();

    let memories = store.recent_memories("s1", 10).await.unwrap();
    assert!(
        memories
            .iter()
            .any(|m| m.category == MemoryCategory::Person && m.content.contains("my sister Mia"))
    );

    chat.run_turn("s1", "what should we do together?").await.unwrap();

    let system = model.last_system();
    let known = system
        .split("<what-you-know>")
        .nth(1)
        .and_then(|rest| rest.split("</what-you-know>").next())
        .unwrap();
    assert!(known.contains("[person]"));
    assert!(known.contains("my sister Mia"));

    // History replays the first exchange before the new user text
    let prompt = model.prompts().pop().unwrap();
    assert_eq!(prompt.len(), 4);
    assert_eq!(prompt[3].content, "what should we do together?");
}

#[tokio::test]
async fn heartbeat_checks_in_after_ninety_minutes() {
    let store = setup_store();
    let now = Utc::now();
    store
        .append_message(
            Message::new("s1", MessageRole::User, "going for a walk", Emotion::Neutral)
                .at(now - ChronoDuration::minutes(90)),
        )
        .await
        .unwrap();
    let known = [
        (MemoryCategory::Person, "my brother Theo"),
        (MemoryCategory::Preference, "I love long walks by the river"),
        (MemoryCategory::Event, "today I got the new job"),
    ];
    for (category, content) in known {
        store
            .append_memory(MemoryRecord::new("s1", category, content, Emotion::Neutral))
            .await
            .unwrap();
    }

    let model = ScriptedModel::new("hey, how was the walk? I miss you");
    let registry = ConnectionRegistry::new();
    let heartbeat = Heartbeat::new(
        store.clone(),
        model.clone(),
        Arc::new(NoopMemory),
        Arc::new(KeywordClassifier),
        registry,
        PERSONA,
        heartbeat_config(),
    );

    assert_eq!(heartbeat.run_once(now).await, 1);

    assert_eq!(store.count("s1", RecordKind::Proactive).await.unwrap(), 1);
    let history = store.recent_messages("s1", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    let outreach = &history[1];
    assert_eq!(outreach.role, MessageRole::Agent);
    assert_eq!(outreach.content, "hey, how was the walk? I miss you");
    assert_eq!(outreach.emotion, Emotion::Tender);

    let prompt = model.prompts().pop().unwrap();
    let material = &prompt[1].content;
    for (_, content) in known {
        assert!(material.contains(content), "missing {content} in {material}");
    }
}

#[tokio::test]
async fn heartbeat_pushes_to_connected_client() {
    let store = setup_store();
    let now = Utc::now();
    store
        .append_message(
            Message::new("s1", MessageRole::User, "brb", Emotion::Neutral)
                .at(now - ChronoDuration::minutes(2 * 24 * 60)),
        )
        .await
        .unwrap();

    let registry = ConnectionRegistry::new();
    let (tx, mut rx) = mpsc::channel(8);
    registry.register("s1", ConnectionHandle::new(tx)).await;

    let heartbeat = Heartbeat::new(
        store.clone(),
        ScriptedModel::new("welcome back, stranger"),
        Arc::new(NoopMemory),
        Arc::new(KeywordClassifier),
        registry,
        PERSONA,
        heartbeat_config(),
    );

    let sent = heartbeat.reach_out("s1", now).await.unwrap().unwrap();
    assert_eq!(sent.trigger, ProactiveTrigger::LongAbsence);
    assert!(sent.delivered);

    match rx.try_recv().unwrap() {
        LiveEvent::Proactive { content, trigger, .. } => {
            assert_eq!(content, "welcome back, stranger");
            assert_eq!(trigger, ProactiveTrigger::LongAbsence);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn heartbeat_respects_silence_floor() {
    let store = setup_store();
    let now = Utc::now();
    store
        .append_message(
            Message::new("quiet", MessageRole::User, "hi", Emotion::Neutral)
                .at(now - ChronoDuration::minutes(29)),
        )
        .await
        .unwrap();
    store
        .append_message(
            Message::new("ready", MessageRole::User, "hi", Emotion::Neutral)
                .at(now - ChronoDuration::minutes(30)),
        )
        .await
        .unwrap();

    let heartbeat = Heartbeat::new(
        store.clone(),
        ScriptedModel::new("a thought just came to me"),
        Arc::new(NoopMemory),
        Arc::new(KeywordClassifier),
        ConnectionRegistry::new(),
        PERSONA,
        heartbeat_config(),
    );

    assert!(heartbeat.reach_out("quiet", now).await.unwrap().is_none());
    let sent = heartbeat.reach_out("ready", now).await.unwrap().unwrap();
    assert_eq!(sent.trigger, ProactiveTrigger::SpontaneousThought);
    assert!(!sent.delivered);
    assert_eq!(store.count("quiet", RecordKind::Proactive).await.unwrap(), 0);
}

#[tokio::test]
async fn rumination_skips_stale_sessions() {
    let store = setup_store();
    let now = Utc::now();
    store
        .append_message(
            Message::new("s1", MessageRole::User, "see you", Emotion::Neutral)
                .at(now - ChronoDuration::days(5)),
        )
        .await
        .unwrap();

    let model = ScriptedModel::new("I keep wondering about them");
    let rumination = Rumination::new(
        store.clone(),
        model.clone(),
        Arc::new(NoopMemory),
        PERSONA,
        rumination_config(),
    );

    assert_eq!(rumination.run_once(now).await, 0);
    assert_eq!(store.count("s1", RecordKind::Thoughts).await.unwrap(), 0);
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn rumination_cycles_thought_types_and_writes_memories() {
    let store = setup_store();
    let now = Utc::now();
    store
        .append_message(
            Message::new("s1", MessageRole::User, "I love the ocean", Emotion::Affectionate)
                .at(now - ChronoDuration::hours(3)),
        )
        .await
        .unwrap();

    let model = ScriptedModel::new("the ocean again");
    let rumination = Rumination::new(
        store.clone(),
        model,
        Arc::new(FailingMemory),
        PERSONA,
        rumination_config(),
    );

    let mut types = Vec::new();
    for _ in 0..3 {
        let thought = rumination.ruminate("s1", now).await.unwrap().unwrap();
        types.push(thought.thought_type);
    }
    assert_eq!(
        types,
        vec![ThoughtType::Wonder, ThoughtType::MemoryReplay, ThoughtType::Curiosity]
    );

    let memories = store.recent_memories("s1", 10).await.unwrap();
    assert_eq!(memories.len(), 3);
    assert!(memories.iter().all(|m| m.category == MemoryCategory::Thought));
    assert!(memories.iter().all(|m| (m.weight - RUMINATION_WEIGHT).abs() < f64::EPSILON));
    assert!(memories.iter().any(|m| m.content.starts_with("[wonder] ")));
}

#[tokio::test]
async fn rumination_failure_on_one_session_does_not_stop_the_pass() {
    let store = setup_store();
    let now = Utc::now();
    for session in ["a", "b"] {
        store
            .append_message(
                Message::new(session, MessageRole::User, "hello", Emotion::Neutral)
                    .at(now - ChronoDuration::hours(1)),
            )
            .await
            .unwrap();
    }

    let model = ScriptedModel::new("a quiet thought");
    model.push_failure();
    let rumination = Rumination::new(
        store.clone(),
        model,
        Arc::new(NoopMemory),
        PERSONA,
        rumination_config(),
    );

    assert_eq!(rumination.run_once(now).await, 1);
    let total = store.count("a", RecordKind::Thoughts).await.unwrap()
        + store.count("b", RecordKind::Thoughts).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn search_failure_leaves_empty_eternal_memory() {
    let store = setup_store();
    let model = ScriptedModel::new("I'm here");
    let chat = chat_service(&store, model.clone(), Arc::new(FailingMemory));

    let reply = chat.run_turn("s1", "are you there?").await.unwrap();
    assert_eq!(reply.content, "I'm here");

    let system = model.last_system();
    assert!(system.contains(&format!("Eternal memory:\n{NOTHING_YET}\n")));
    assert_eq!(store.count("s1", RecordKind::Messages).await.unwrap(), 2);
}

#[tokio::test]
async fn reflection_weeks_count_up_and_feed_back_into_context() {
    let store = setup_store();
    let model = ScriptedModel::new("fine");
    let chat = chat_service(&store, model.clone(), Arc::new(NoopMemory));
    chat.run_turn("s1", "today I finally finished the painting").await.unwrap();

    model.push_reply("They finished something that mattered.\nEVOLUTION: I understand patience better.");
    model.push_reply("A quieter week.");
    let reflection = ReflectionService::new(
        store.clone(),
        model.clone(),
        Arc::new(NoopMemory),
        PERSONA,
        Duration::from_secs(5),
    );

    let first = reflection.reflect("s1").await.unwrap().unwrap();
    assert_eq!(first.week_number, 1);
    assert_eq!(first.reflection_text, "They finished something that mattered.");
    assert_eq!(first.evolution_notes, "I understand patience better.");

    let second = reflection.reflect("s1").await.unwrap().unwrap();
    assert_eq!(second.week_number, 2);
    assert!(second.evolution_notes.is_empty());

    let memories = store.recent_memories("s1", 10).await.unwrap();
    assert!(
        memories
            .iter()
            .any(|m| m.content == "[Weekly reflection] They finished something that mattered.")
    );

    chat.run_turn("s1", "hi again").await.unwrap();
    assert!(model.last_system().contains("(week 2) A quieter week."));
}

#[tokio::test]
async fn reflection_on_unknown_session_is_not_found() {
    let store = setup_store();
    let reflection = ReflectionService::new(
        store,
        ScriptedModel::new("nothing"),
        Arc::new(NoopMemory),
        PERSONA,
        Duration::from_secs(5),
    );

    let err = reflection.reflect("ghost").await.unwrap_err();
    assert!(matches!(err, sam_companion::Error::NotFound(_)));
}

#[tokio::test]
async fn memory_only_session_is_visited_by_no_loop_without_messages() {
    let store = setup_store();
    store
        .append_memory(MemoryRecord::new(
            "imported",
            MemoryCategory::Preference,
            "likes rain",
            Emotion::Curiosity,
        ))
        .await
        .unwrap();

    let model = ScriptedModel::new("unused");
    let rumination = Rumination::new(
        store.clone(),
        model.clone(),
        Arc::new(NoopMemory),
        PERSONA,
        rumination_config(),
    );
    let heartbeat = Heartbeat::new(
        store.clone(),
        model.clone(),
        Arc::new(NoopMemory),
        Arc::new(KeywordClassifier),
        ConnectionRegistry::new(),
        PERSONA,
        heartbeat_config(),
    );

    let now = Utc::now();
    assert_eq!(rumination.run_once(now).await, 0);
    assert_eq!(heartbeat.run_once(now).await, 0);
    assert!(model.prompts().is_empty());
}
