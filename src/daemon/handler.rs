//! Control socket command handler for the controller process.

use crate::codec::envelope::BusMessage;
use crate::controller::{ControllerEvent, ControllerStatus};
use crate::esl::EslCommander;
use crate::ipc::protocol::{Command, Response};
use crate::ipc::server::CommandHandler;
use crate::store::{EventBus, PublishedMessage};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Bridges control socket commands onto the controller's event queue.
pub struct ControllerCommandHandler {
    events: mpsc::UnboundedSender<ControllerEvent>,
    status: watch::Receiver<ControllerStatus>,
    bus: Arc<dyn EventBus>,
    commander: Arc<EslCommander>,
}

impl ControllerCommandHandler {
    pub fn new(
        events: mpsc::UnboundedSender<ControllerEvent>,
        status: watch::Receiver<ControllerStatus>,
        bus: Arc<dyn EventBus>,
        commander: Arc<EslCommander>,
    ) -> Self {
        Self {
            events,
            status,
            bus,
            commander,
        }
    }

    fn inject(&self, message: serde_json::Value) -> Response {
        let Some(bus_message) = BusMessage::from_value(&message) else {
            return Response::Error {
                message: "Not a bus message: header name missing".to_string(),
            };
        };

        // Messages the controller does not act on are accepted and dropped
        let Some(event) = ControllerEvent::from_bus(&bus_message) else {
            tracing::trace!(name = bus_message.name, "ignoring bus message");
            return Response::Ok;
        };

        match self.events.send(event) {
            Ok(()) => Response::Ok,
            Err(_) => Response::Error {
                message: "Controller is shutting down".to_string(),
            },
        }
    }

    async fn status(&self) -> Response {
        let status = *self.status.borrow();
        Response::Status {
            version: crate::version_string(),
            esl_connected: self.commander.is_connected().await,
            channels: status.channels,
            active: status.active,
            stop_pending: status.stop_pending,
            restart_pending: status.restart_pending,
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for ControllerCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Bus { message } => self.inject(message),
            Command::Status => self.status().await,
            // Streamed by the server before reaching here
            Command::Subscribe => Response::Error {
                message: "Subscribe must be streamed".to_string(),
            },
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<PublishedMessage>> {
        Some(self.bus.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::SettingsChange;
    use crate::store::MemoryStore;
    use serde_json::json;

    struct Fixture {
        handler: ControllerCommandHandler,
        events: mpsc::UnboundedReceiver<ControllerEvent>,
        status: watch::Sender<ControllerStatus>,
    }

    fn fixture() -> Fixture {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(ControllerStatus::default());
        let bus: Arc<dyn EventBus> = Arc::new(MemoryStore::new());
        let handler = ControllerCommandHandler::new(
            events_tx,
            status_rx,
            bus,
            Arc::new(EslCommander::new()),
        );
        Fixture {
            handler,
            events,
            status,
        }
    }

    #[tokio::test]
    async fn test_bus_command_queues_controller_event() {
        let mut fx = fixture();
        let message = json!({
            "envelope": { "name": "UserSpeechLocaleChangedEvtMsg" },
            "core": {
                "header": { "name": "UserSpeechLocaleChangedEvtMsg", "userId": "w_1" },
                "body": { "provider": "gladia", "locale": "fr-FR" }
            }
        });

        let response = fx.handler.handle(Command::Bus { message }).await;
        assert_eq!(response, Response::Ok);
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ControllerEvent::SettingsChanged {
                user_id: "w_1".to_string(),
                change: SettingsChange::Locale {
                    provider: "gladia".to_string(),
                    locale: "fr-FR".to_string(),
                },
            }
        );
    }

    #[tokio::test]
    async fn test_unrelated_bus_message_is_accepted_and_dropped() {
        let mut fx = fixture();
        let message = json!({ "core": { "header": { "name": "SomethingElseEvtMsg" }, "body": {} } });

        assert_eq!(fx.handler.handle(Command::Bus { message }).await, Response::Ok);
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_bus_message_is_rejected() {
        let fx = fixture();
        let response = fx
            .handler
            .handle(Command::Bus {
                message: json!({ "hello": "world" }),
            })
            .await;
        assert!(matches!(response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn test_status_reflects_controller_snapshot() {
        let fx = fixture();
        fx.status.send_replace(ControllerStatus {
            channels: 2,
            active: 1,
            stop_pending: 1,
            restart_pending: 0,
        });

        match fx.handler.handle(Command::Status).await {
            Response::Status {
                esl_connected,
                channels,
                active,
                stop_pending,
                version,
                ..
            } => {
                assert!(!esl_connected);
                assert_eq!((channels, active, stop_pending), (2, 1, 1));
                assert_eq!(version, crate::version_string());
            }
            other => panic!("Expected Status response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_controller_queue_reports_error() {
        let fx = fixture();
        drop(fx.events);
        let message = json!({
            "core": {
                "header": { "name": "MeetingCreatedEvtMsg" },
                "body": { "props": { "meetingProp": { "intId": "m1" }, "voiceProp": { "voiceConf": "7000" } } }
            }
        });
        let response = fx.handler.handle(Command::Bus { message }).await;
        assert!(matches!(response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn test_subscribe_follows_bus() {
        let fx = fixture();
        let mut feed = fx.handler.subscribe().unwrap();
        fx.handler
            .bus
            .publish("chan", json!({ "n": 1 }))
            .await
            .unwrap();
        assert_eq!(feed.recv().await.unwrap().message, json!({ "n": 1 }));
    }
}
