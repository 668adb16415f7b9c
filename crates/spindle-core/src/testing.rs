//! Test doubles for driving the controller without a real model
//!
//! [`ScriptedEngine`] replays a fixed token script and can be told to fail
//! on a given step. [`CountingTokenizer`] wraps any tokenizer and counts the
//! decode streams it hands out. Both report through shared probes so tests
//! can check how often the engine was touched and that every resource was
//! released exactly once.

use crate::engine::{GenerationEngine, Generator};
use crate::generation::GeneratorParams;
use crate::tokenizer::vocab::TokenizerFile;
use crate::tokenizer::{DecodeStream, Tokenizer, VocabTokenizer, Vocabulary};
use crate::{codes, CoreError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Token ids of the in-memory chat vocabulary built by [`chat_tokenizer`]
pub mod chat {
    pub const BOS: u32 = 0;
    pub const PAD: u32 = 1;
    pub const USER: u32 = 2;
    pub const END: u32 = 3;
    pub const ASSISTANT: u32 = 4;
    pub const NEWLINE: u32 = 5;
    pub const SPACE: u32 = 6;
    pub const HI: u32 = 7;
    pub const THERE: u32 = 8;
    pub const BANG: u32 = 9;
    pub const HELLO: u32 = 10;
    /// `<0xC3>` and `<0xA9>`, together `é`
    pub const E_ACUTE: [u32; 2] = [11, 12];
}

/// Small chat vocabulary: the template markers, a few words, ASCII letters
/// and the two bytes of `é`. Characters outside it (e.g. CJK) cannot be encoded.
pub fn chat_tokenizer() -> VocabTokenizer {
    let mut pieces: Vec<String> = [
        "<s>",
        "</s>",
        "<|user|>",
        "<|end|>",
        "<|assistant|>",
        "\n",
        "\u{2581}",
        "Hi",
        "\u{2581}there",
        "!",
        "Hello",
        "<0xC3>",
        "<0xA9>",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect();
    pieces.extend(('a'..='z').chain('A'..='Z').map(String::from));

    let file = TokenizerFile {
        pieces,
        special_tokens: vec!["<|user|>".to_string(), "<|assistant|>".to_string()],
        bos_token: Some("<s>".to_string()),
        eos_token: Some("<|end|>".to_string()),
        pad_token: Some("</s>".to_string()),
        unk_token: None,
    };
    match Vocabulary::from_tokenizer_file(file) {
        Ok(vocab) => VocabTokenizer::new(vocab),
        Err(e) => panic!("built-in chat vocabulary is invalid: {e}"),
    }
}

/// Shared counters of a [`ScriptedEngine`]
#[derive(Debug, Clone, Default)]
pub struct EngineProbe {
    inner: Arc<ProbeCounters>,
}

#[derive(Debug, Default)]
struct ProbeCounters {
    generators_created: AtomicUsize,
    generators_released: AtomicUsize,
    steps: AtomicUsize,
    appended: Mutex<Vec<Vec<u32>>>,
}

impl EngineProbe {
    pub fn generators_created(&self) -> usize {
        self.inner.generators_created.load(Ordering::SeqCst)
    }

    pub fn generators_released(&self) -> usize {
        self.inner.generators_released.load(Ordering::SeqCst)
    }

    /// Calls to `generate_next_token`, failed ones included
    pub fn steps(&self) -> usize {
        self.inner.steps.load(Ordering::SeqCst)
    }

    /// Token sequences appended to generators, in order
    pub fn appended(&self) -> Vec<Vec<u32>> {
        match self.inner.appended.lock() {
            Ok(appended) => appended.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Engine that replays a fixed script of tokens
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    script: Vec<u32>,
    fail_at_step: Option<usize>,
    probe: EngineProbe,
}

impl ScriptedEngine {
    pub fn new(script: Vec<u32>) -> Self {
        Self {
            script,
            fail_at_step: None,
            probe: EngineProbe::default(),
        }
    }

    /// Make the `step`-th call to `generate_next_token` (1-based) fail
    pub fn fail_at_step(mut self, step: usize) -> Self {
        self.fail_at_step = Some(step);
        self
    }

    pub fn probe(&self) -> EngineProbe {
        self.probe.clone()
    }
}

impl GenerationEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn create_generator(&self, _params: &GeneratorParams) -> Result<Box<dyn Generator>> {
        self.probe
            .inner
            .generators_created
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedGenerator {
            script: self.script.clone(),
            fail_at_step: self.fail_at_step,
            position: 0,
            seeded: false,
            next: Vec::with_capacity(1),
            probe: self.probe.clone(),
        }))
    }
}

struct ScriptedGenerator {
    script: Vec<u32>,
    fail_at_step: Option<usize>,
    position: usize,
    seeded: bool,
    next: Vec<u32>,
    probe: EngineProbe,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn append_tokens(&mut self, tokens: &[u32]) -> Result<()> {
        self.seeded = true;
        let mut appended = match self.probe.inner.appended.lock() {
            Ok(appended) => appended,
            Err(poisoned) => poisoned.into_inner(),
        };
        appended.push(tokens.to_vec());
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.seeded && self.position >= self.script.len()
    }

    async fn generate_next_token(&mut self) -> Result<()> {
        let step = self.probe.inner.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at_step == Some(step) {
            return Err(CoreError::generation(
                codes::GENERATOR_FAULT,
                format!("Scripted failure at step {}", step),
                "Scripted generator",
                "This failure was requested by the test",
            ));
        }

        let token = self.script.get(self.position).copied().ok_or_else(|| {
            CoreError::generation(
                codes::SESSION_FINISHED,
                "Script exhausted",
                "Scripted generator",
                "Check is_done() before generating",
            )
        })?;
        self.position += 1;
        self.next.clear();
        self.next.push(token);
        Ok(())
    }

    fn next_tokens(&self) -> &[u32] {
        &self.next
    }
}

impl Drop for ScriptedGenerator {
    fn drop(&mut self) {
        self.probe
            .inner
            .generators_released
            .fetch_add(1, Ordering::SeqCst);
    }
}

/// Shared counters of a [`CountingTokenizer`]
#[derive(Debug, Clone, Default)]
pub struct TokenizerProbe {
    inner: Arc<TokenizerCounters>,
}

#[derive(Debug, Default)]
struct TokenizerCounters {
    encodes: AtomicUsize,
    streams_created: AtomicUsize,
    streams_released: AtomicUsize,
    tokens_decoded: AtomicUsize,
}

impl TokenizerProbe {
    pub fn encodes(&self) -> usize {
        self.inner.encodes.load(Ordering::SeqCst)
    }

    pub fn streams_created(&self) -> usize {
        self.inner.streams_created.load(Ordering::SeqCst)
    }

    pub fn streams_released(&self) -> usize {
        self.inner.streams_released.load(Ordering::SeqCst)
    }

    /// Tokens passed to any decode stream
    pub fn tokens_decoded(&self) -> usize {
        self.inner.tokens_decoded.load(Ordering::SeqCst)
    }
}

/// Tokenizer wrapper that counts encodes and decode streams
pub struct CountingTokenizer<T> {
    inner: T,
    probe: TokenizerProbe,
}

impl<T: Tokenizer> CountingTokenizer<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            probe: TokenizerProbe::default(),
        }
    }

    pub fn probe(&self) -> TokenizerProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl<T: Tokenizer> Tokenizer for CountingTokenizer<T> {
    async fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.probe.inner.encodes.fetch_add(1, Ordering::SeqCst);
        self.inner.encode(text).await
    }

    async fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.inner.decode(tokens).await
    }

    fn create_stream(&self) -> Box<dyn DecodeStream + '_> {
        self.probe
            .inner
            .streams_created
            .fetch_add(1, Ordering::SeqCst);
        Box::new(CountingStream {
            inner: self.inner.create_stream(),
            probe: self.probe.clone(),
        })
    }

    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.inner.eos_token_id()
    }

    fn is_special_token(&self, id: u32) -> bool {
        self.inner.is_special_token(id)
    }

    fn id_to_token(&self, id: u32) -> Option<&str> {
        self.inner.id_to_token(id)
    }
}

struct CountingStream<'a> {
    inner: Box<dyn DecodeStream + 'a>,
    probe: TokenizerProbe,
}

impl DecodeStream for CountingStream<'_> {
    fn decode(&mut self, token_id: u32) -> Result<String> {
        self.probe
            .inner
            .tokens_decoded
            .fetch_add(1, Ordering::SeqCst);
        self.inner.decode(token_id)
    }

    fn pending_bytes(&self) -> usize {
        self.inner.pending_bytes()
    }
}

impl Drop for CountingStream<'_> {
    fn drop(&mut self) {
        self.probe
            .inner
            .streams_released
            .fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_tokenizer_ids() {
        let tok = chat_tokenizer();
        let ids = tok.encode("<|user|>\nHello <|end|>\n<|assistant|>").await.unwrap();
        assert_eq!(
            ids,
            vec![chat::USER, chat::NEWLINE, chat::HELLO, chat::SPACE, chat::END, chat::NEWLINE, chat::ASSISTANT]
        );
        assert_eq!(tok.decode(&[chat::HI, chat::THERE, chat::BANG]).await.unwrap(), "Hi there!");
        assert_eq!(tok.decode(&chat::E_ACUTE).await.unwrap(), "\u{e9}");
    }

    #[tokio::test]
    async fn test_scripted_engine_counts() {
        let engine = ScriptedEngine::new(vec![5, 6]).fail_at_step(2);
        let probe = engine.probe();
        let mut generator = engine.create_generator(&GeneratorParams::default()).unwrap();
        generator.append_tokens(&[1, 2]).unwrap();
        generator.generate_next_token().await.unwrap();
        assert_eq!(generator.next_tokens(), &[5]);
        assert!(generator.generate_next_token().await.is_err());
        drop(generator);

        assert_eq!(probe.steps(), 2);
        assert_eq!(probe.appended(), vec![vec![1, 2]]);
        assert_eq!(probe.generators_released(), 1);
    }
}
