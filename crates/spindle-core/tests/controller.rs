use spindle_core::engine::SamplingModel;
use spindle_core::model::bigram::{BigramModel, BigramWeights, Transition};
use spindle_core::testing::{
    chat, chat_tokenizer, CountingTokenizer, EngineProbe, ScriptedEngine, TokenizerProbe,
};
use spindle_core::{
    codes, CancellationToken, ErrorKind, RunOutcome, RunStatus, SearchOptions, SessionController,
};
use std::sync::Arc;

struct Harness {
    controller: SessionController,
    engine: EngineProbe,
    tokenizer: TokenizerProbe,
}

fn harness(engine: ScriptedEngine) -> Harness {
    let engine_probe = engine.probe();
    let tokenizer = CountingTokenizer::new(chat_tokenizer());
    let tokenizer_probe = tokenizer.probe();
    Harness {
        controller: SessionController::new(Arc::new(engine), Arc::new(tokenizer)),
        engine: engine_probe,
        tokenizer: tokenizer_probe,
    }
}

async fn collect(controller: &SessionController, text: &str, cancel: &CancellationToken) -> (RunOutcome, Vec<String>) {
    let mut fragments = Vec::new();
    let outcome = controller
        .generate(text, &SearchOptions::default(), cancel, |fragment| {
            fragments.push(fragment.to_string());
            Ok(())
        })
        .await;
    (outcome, fragments)
}

#[tokio::test]
async fn hello_streams_hi_there() {
    let h = harness(ScriptedEngine::new(vec![chat::HI, chat::THERE, chat::BANG, chat::END]));
    let (outcome, fragments) = collect(&h.controller, "Hello", &CancellationToken::new()).await;

    assert!(outcome.status.is_completed());
    assert_eq!(fragments.concat(), "Hi there!");
    assert_eq!(
        h.engine.appended(),
        vec![vec![
            chat::USER,
            chat::NEWLINE,
            chat::HELLO,
            chat::SPACE,
            chat::END,
            chat::NEWLINE,
            chat::ASSISTANT
        ]]
    );
    // the end marker decodes to nothing and is not emitted
    assert_eq!(outcome.stats.tokens_generated, 4);
    assert_eq!(outcome.stats.fragments_emitted, 3);
}

#[tokio::test]
async fn completed_run_releases_everything_once() {
    let h = harness(ScriptedEngine::new(vec![chat::HI]));
    let (outcome, _) = collect(&h.controller, "Hello", &CancellationToken::new()).await;

    assert!(outcome.status.is_completed());
    assert_eq!(h.engine.generators_created(), 1);
    assert_eq!(h.engine.generators_released(), 1);
    assert_eq!(h.tokenizer.streams_created(), 1);
    assert_eq!(h.tokenizer.streams_released(), 1);
}

#[tokio::test]
async fn empty_input_never_reaches_tokenizer_or_engine() {
    let h = harness(ScriptedEngine::new(vec![chat::HI]));
    for text in ["", "   "] {
        let (outcome, fragments) = collect(&h.controller, text, &CancellationToken::new()).await;
        assert_eq!(outcome.status.failure_kind(), Some(ErrorKind::EmptyInput));
        assert!(fragments.is_empty());
    }
    assert_eq!(h.tokenizer.encodes(), 0);
    assert_eq!(h.engine.generators_created(), 0);
}

#[tokio::test]
async fn unencodable_prompt_fails_before_generation() {
    let h = harness(ScriptedEngine::new(vec![chat::HI]));
    let (outcome, fragments) = collect(&h.controller, "\u{65e5}\u{672c}", &CancellationToken::new()).await;

    assert_eq!(outcome.status.failure_kind(), Some(ErrorKind::Encoding));
    assert!(fragments.is_empty());
    assert_eq!(h.engine.generators_created(), 0);
    assert_eq!(h.tokenizer.streams_created(), 0);
}

#[tokio::test]
async fn cancel_before_first_step() {
    let h = harness(ScriptedEngine::new(vec![chat::HI, chat::THERE]));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (outcome, fragments) = collect(&h.controller, "Hello", &cancel).await;

    assert!(outcome.status.is_cancelled());
    assert!(fragments.is_empty());
    assert_eq!(h.engine.steps(), 0);
    assert_eq!(h.engine.generators_released(), 1);
    assert_eq!(h.tokenizer.streams_released(), 1);
}

#[tokio::test]
async fn cancel_from_sink_stops_after_current_fragment() {
    let h = harness(ScriptedEngine::new(vec![chat::HI, chat::THERE, chat::BANG]));
    let cancel = CancellationToken::new();
    let mut fragments = Vec::new();
    let outcome = h
        .controller
        .generate("Hello", &SearchOptions::default(), &cancel, |fragment| {
            fragments.push(fragment.to_string());
            cancel.cancel();
            Ok(())
        })
        .await;

    assert!(outcome.status.is_cancelled());
    assert_eq!(fragments, vec!["Hi"]);
    assert_eq!(h.engine.steps(), 1);
    assert_eq!(h.tokenizer.tokens_decoded(), 1);
    assert_eq!(h.engine.generators_released(), 1);
}

#[tokio::test]
async fn failure_keeps_earlier_fragments() {
    let h = harness(ScriptedEngine::new(vec![chat::HI, chat::THERE, chat::BANG]).fail_at_step(3));
    let (outcome, fragments) = collect(&h.controller, "Hello", &CancellationToken::new()).await;

    assert_eq!(outcome.status.failure_kind(), Some(ErrorKind::Generation));
    assert_eq!(fragments, vec!["Hi", " there"]);
    assert_eq!(h.engine.steps(), 3);
    assert_eq!(h.engine.generators_released(), 1);
    assert_eq!(h.tokenizer.streams_released(), 1);
}

#[tokio::test]
async fn unknown_token_fails_decoding_and_keeps_earlier_text() {
    let h = harness(ScriptedEngine::new(vec![chat::HI, chat::THERE, 10_000, chat::BANG]));
    let (outcome, fragments) = collect(&h.controller, "Hello", &CancellationToken::new()).await;

    match &outcome.status {
        RunStatus::Failed(err) => {
            assert_eq!(err.kind(), ErrorKind::Decoding);
            assert_eq!(err.code(), codes::TOKENIZER_UNKNOWN_TOKEN);
        }
        status => panic!("expected a decoding failure, got {}", status),
    }
    assert_eq!(fragments, vec!["Hi", " there"]);
    assert_eq!(outcome.stats.tokens_generated, 3);
    assert_eq!(h.engine.steps(), 3);
    assert_eq!(h.engine.generators_created(), 1);
    assert_eq!(h.engine.generators_released(), 1);
    assert_eq!(h.tokenizer.streams_created(), 1);
    assert_eq!(h.tokenizer.streams_released(), 1);
}

#[tokio::test]
async fn split_character_is_emitted_once_complete() {
    let h = harness(ScriptedEngine::new(vec![
        chat::HI,
        chat::E_ACUTE[0],
        chat::E_ACUTE[1],
        chat::BANG,
    ]));
    let (outcome, fragments) = collect(&h.controller, "Hello", &CancellationToken::new()).await;

    assert!(outcome.status.is_completed());
    assert_eq!(fragments, vec!["Hi", "\u{e9}", "!"]);
    assert_eq!(outcome.stats.tokens_generated, 4);
    assert_eq!(h.tokenizer.tokens_decoded(), 4);
}

#[tokio::test]
async fn concurrent_runs_are_independent() {
    let h = harness(ScriptedEngine::new(vec![chat::HI, chat::E_ACUTE[0], chat::E_ACUTE[1]]));
    let cancel = CancellationToken::new();
    let (first, second) = tokio::join!(
        collect(&h.controller, "Hello", &cancel),
        collect(&h.controller, "Hi", &cancel)
    );

    assert_eq!(first.1.concat(), "Hi\u{e9}");
    assert_eq!(second.1.concat(), "Hi\u{e9}");
    assert_eq!(h.engine.generators_created(), 2);
    assert_eq!(h.engine.generators_released(), 2);
    assert_eq!(h.tokenizer.streams_released(), 2);
}

#[tokio::test]
async fn sampling_engine_end_to_end() {
    let weights = BigramWeights {
        base_logit: -10.0,
        default: vec![(chat::END, 1.0)],
        transitions: vec![
            Transition {
                after: chat::ASSISTANT,
                next: vec![(chat::HI, 8.0), (chat::HELLO, 6.0)],
            },
            Transition {
                after: chat::HI,
                next: vec![(chat::THERE, 8.0)],
            },
            Transition {
                after: chat::THERE,
                next: vec![(chat::BANG, 8.0)],
            },
        ],
    };
    let tokenizer = chat_tokenizer();
    let vocab_size = tokenizer.vocab().size();
    let model = BigramModel::new("tiny", vocab_size, 256, weights).unwrap();
    let engine = SamplingModel::new(Arc::new(model), vec![chat::END]);
    let controller = SessionController::new(Arc::new(engine), Arc::new(tokenizer));

    let (outcome, fragments) = collect(&controller, "Hello", &CancellationToken::new()).await;
    assert!(outcome.status.is_completed());
    assert_eq!(fragments.concat(), "Hi there!");
    assert_eq!(outcome.stats.tokens_generated, 4);

    // max_length counts the prompt: 7 prompt tokens leave room for 2
    let options = SearchOptions {
        max_length: Some(9),
        ..Default::default()
    };
    let mut text = String::new();
    let outcome = controller
        .generate("Hello", &options, &CancellationToken::new(), |f| {
            text.push_str(f);
            Ok(())
        })
        .await;
    assert!(outcome.status.is_completed());
    assert_eq!(text, "Hi there");
}
