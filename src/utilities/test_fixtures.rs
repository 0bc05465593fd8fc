use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::transport::{FragmentStream, GenerationTransport, TransportError};

#[derive(Clone, Debug)]
pub struct Call {
    pub prompt: String,
    pub system_instruction: String,
    pub schema: Option<Value>,
}

/// Replays canned fragments or a canned structured payload, recording every call.
#[derive(Default)]
pub struct ScriptedTransport {
    fragments: Vec<String>,
    stream_error: Option<String>,
    payload: Option<String>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|&fragment| fragment.into()).collect(),
            ..Self::default()
        }
    }

    pub fn payload(payload: &str) -> Self {
        Self { payload: Some(payload.into()), ..Self::default() }
    }

    /// Fails every structured request with a 500.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_stream_error(mut self, reason: &str) -> Self {
        self.stream_error = Some(reason.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, prompt: &str, system_instruction: &str, schema: Option<&Value>) {
        self.calls.lock().unwrap().push(Call {
            prompt: prompt.into(),
            system_instruction: system_instruction.into(),
            schema: schema.cloned(),
        });
    }
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn stream_generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<FragmentStream, TransportError> {
        self.record(prompt, system_instruction, None);

        let fragments = self.fragments.clone().into_iter().map(Ok);
        let error =
            self.stream_error.clone().map(|reason| Err(TransportError::MalformedStream(reason)));

        Ok(stream::iter(fragments.chain(error)).boxed())
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        system_instruction: &str,
        schema: &Value,
    ) -> Result<String, TransportError> {
        self.record(prompt, system_instruction, Some(schema));

        self.payload.clone().ok_or(TransportError::Status(StatusCode::INTERNAL_SERVER_ERROR))
    }
}

/// Hands out fragments only when the test sends them, so tests can act while a
/// stream is still open.
pub struct ControlledTransport {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<String, TransportError>>>>,
}

impl ControlledTransport {
    pub fn new() -> (Self, mpsc::UnboundedSender<Result<String, TransportError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx: Mutex::new(Some(rx)) }, tx)
    }
}

#[async_trait]
impl GenerationTransport for ControlledTransport {
    async fn stream_generate(&self, _: &str, _: &str) -> Result<FragmentStream, TransportError> {
        let rx = self.rx.lock().unwrap().take().expect("stream requested twice");

        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
            .boxed())
    }

    async fn generate_structured(
        &self,
        _: &str,
        _: &str,
        _: &Value,
    ) -> Result<String, TransportError> {
        Err(TransportError::Status(StatusCode::NOT_IMPLEMENTED))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_controlled_transport() {
        let (transport, tx) = ControlledTransport::new();
        let mut fragments = transport.stream_generate("prompt", "system").await.unwrap();

        tx.send(Ok("Hola".into())).unwrap();
        drop(tx);
        assert_eq!(fragments.next().await.unwrap().unwrap(), "Hola");
        assert!(fragments.next().await.is_none());

        let result = transport.generate_structured("prompt", "system", &Value::Null).await;
        assert!(matches!(result, Err(TransportError::Status(StatusCode::NOT_IMPLEMENTED))));
    }
}
