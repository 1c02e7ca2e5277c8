// Recording link used by the engine and connection tests.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use landroid_api::{CustomAuthHeaders, LinkConnector, LinkEvent, LinkOptions, PubSubLink};
use tokio::sync::mpsc;

#[derive(Default)]
struct Recorded {
    opened: Vec<LinkOptions>,
    subscriptions: Vec<String>,
    published: Vec<(String, Vec<u8>)>,
    auth_updates: Vec<String>,
    closed: usize,
    sender: Option<mpsc::UnboundedSender<LinkEvent>>,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    recorded: Arc<Mutex<Recorded>>,
}

impl FakeConnector {
    pub fn opened(&self) -> Vec<LinkOptions> {
        self.recorded.lock().unwrap().opened.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.recorded.lock().unwrap().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.recorded.lock().unwrap().published.clone()
    }

    pub fn take_published(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.recorded.lock().unwrap().published)
    }

    /// `jwt` header of every hot-swapped credential set.
    pub fn auth_updates(&self) -> Vec<String> {
        self.recorded.lock().unwrap().auth_updates.clone()
    }

    pub fn closed(&self) -> usize {
        self.recorded.lock().unwrap().closed
    }

    /// Raise `event` on the most recently opened link.
    pub fn emit(&self, event: LinkEvent) {
        let recorded = self.recorded.lock().unwrap();
        if let Some(sender) = &recorded.sender {
            let _ = sender.send(event);
        }
    }
}

impl LinkConnector for FakeConnector {
    fn open(
        &self,
        options: LinkOptions,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PubSubLink>, landroid_api::Error> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.opened.push(options);
        recorded.sender = Some(events);
        Ok(Box::new(FakeLink {
            recorded: Arc::clone(&self.recorded),
        }))
    }
}

struct FakeLink {
    recorded: Arc<Mutex<Recorded>>,
}

impl PubSubLink for FakeLink {
    fn subscribe(&self, topic: &str) -> Result<(), landroid_api::Error> {
        self.recorded.lock().unwrap().subscriptions.push(topic.to_owned());
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), landroid_api::Error> {
        self.recorded
            .lock()
            .unwrap()
            .published
            .push((topic.to_owned(), payload));
        Ok(())
    }

    fn update_auth_headers(&self, headers: CustomAuthHeaders) {
        self.recorded.lock().unwrap().auth_updates.push(headers.jwt);
    }

    fn close(&self) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.closed += 1;
        recorded.sender = None;
    }
}
