use std::{
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

use anyhow::Error;
use assert_matches::assert_matches;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use turnstile::{
    core::{
        error::{
            BasicError,
            InteractionError,
            NotEstablishedError,
            SessionClosedError,
        },
        id::Id,
        stream::{
            DirectMessageStream,
            MessageStream,
            direct_message_stream_pair,
        },
        types::Dictionary,
        uri::Uri,
    },
    message::message::{
        AbortMessage,
        GoodbyeMessage,
        Message,
        WelcomeMessage,
    },
    peer::{
        CloseDetails,
        PeerConfig,
        PeerNotConnectedError,
        RpcCall,
        SessionInfo,
        SessionObserver,
        WebSocketPeer,
        new_web_socket_peer,
    },
};

const REALM: &str = "com.test.realm";

fn create_peer(name: &str) -> Result<WebSocketPeer, Error> {
    let mut config = PeerConfig::default();
    config.name = name.to_owned();
    new_web_socket_peer(config)
}

async fn connect(peer: &WebSocketPeer) -> DirectMessageStream {
    let (stream, router) = direct_message_stream_pair();
    peer.direct_connect(Box::new(stream)).await.unwrap();
    router
}

async fn accept_join(router: &mut DirectMessageStream) {
    let hello = router.receive_message().await.unwrap().unwrap();
    assert_matches!(hello, Message::Hello(message) => {
        assert_eq!(message.realm.as_str(), REALM);
        assert!(message.details.contains_key("roles"));
    });
    router
        .send_message(Message::Welcome(WelcomeMessage {
            session: Id::try_from(8234).unwrap(),
            details: Dictionary::default(),
        }))
        .await
        .unwrap();
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

#[async_trait]
impl SessionObserver for RecordingObserver {
    async fn on_join(&self, info: SessionInfo) {
        self.events.lock().unwrap().push(format!("join:{}", info.realm));
    }

    async fn on_leave(&self, details: CloseDetails) {
        self.events
            .lock()
            .unwrap()
            .push(format!("leave:{}", details.reason));
    }

    async fn on_disconnect(&self) {
        self.events.lock().unwrap().push("disconnect".to_owned());
    }
}

impl RecordingObserver {
    fn snapshot(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    async fn wait_for(&self, event: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if self.snapshot().iter().any(|seen| seen == event) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {event} event"));
    }
}

#[tokio::test]
async fn join_realm_establishes_session() {
    test_utils::setup::setup_test_environment();

    let observer = Arc::new(RecordingObserver::default());
    let mut peer = create_peer("join_realm_establishes_session").unwrap();
    peer.set_observer(observer.clone());
    let mut router = connect(&peer).await;

    let (result, _) = tokio::join!(peer.join_realm(REALM), accept_join(&mut router));
    let info = result.unwrap();
    assert_eq!(info.realm.as_str(), REALM);
    assert_eq!(info.session_id, Id::try_from(8234).unwrap());

    observer.wait_for(&format!("join:{REALM}")).await;
}

#[tokio::test]
async fn join_realm_fails_with_router_abort() {
    test_utils::setup::setup_test_environment();

    let peer = create_peer("join_realm_fails_with_router_abort").unwrap();
    let mut session_finished_rx = peer.session_finished_rx();
    let mut router = connect(&peer).await;

    let (result, _) = tokio::join!(peer.join_realm(REALM), async {
        let hello = router.receive_message().await.unwrap().unwrap();
        assert_matches!(hello, Message::Hello(_));
        router
            .send_message(Message::Abort(AbortMessage {
                details: Dictionary::default(),
                reason: Uri::try_from("wamp.error.no_such_realm").unwrap(),
            }))
            .await
            .unwrap();
    });
    assert_matches!(result, Err(err) => {
        assert_matches!(
            err.downcast_ref::<InteractionError>(),
            Some(InteractionError::NoSuchRealm)
        );
    });

    // The failed join closes the session, and the connection goes with it.
    session_finished_rx.recv().await.unwrap();
    assert_matches!(peer.join_realm(REALM).await, Err(err) => {
        assert!(err.downcast_ref::<PeerNotConnectedError>().is_some());
    });
}

#[tokio::test]
async fn join_realm_fails_in_established_session() {
    test_utils::setup::setup_test_environment();

    let peer = create_peer("join_realm_fails_in_established_session").unwrap();
    let mut router = connect(&peer).await;

    let (result, _) = tokio::join!(peer.join_realm(REALM), accept_join(&mut router));
    assert_matches!(result, Ok(_));

    assert_matches!(peer.join_realm(REALM).await, Err(err) => {
        assert_matches!(err.downcast_ref::<BasicError>(), Some(BasicError::NotAllowed(_)));
    });
}

#[tokio::test]
async fn leave_realm_completes_goodbye_handshake() {
    test_utils::setup::setup_test_environment();

    let observer = Arc::new(RecordingObserver::default());
    let mut peer = create_peer("leave_realm_completes_goodbye_handshake").unwrap();
    peer.set_observer(observer.clone());
    let mut router = connect(&peer).await;

    let (result, _) = tokio::join!(peer.join_realm(REALM), accept_join(&mut router));
    assert_matches!(result, Ok(_));

    let (result, _) = tokio::join!(peer.leave_realm(), async {
        let goodbye = router.receive_message().await.unwrap().unwrap();
        assert_matches!(goodbye, Message::Goodbye(message) => {
            assert_eq!(message.reason.as_str(), "wamp.close.normal");
        });
        router
            .send_message(Message::Goodbye(GoodbyeMessage {
                details: Dictionary::default(),
                reason: Uri::try_from("wamp.close.goodbye_and_out").unwrap(),
            }))
            .await
            .unwrap();
    });
    let details = result.unwrap();
    assert_eq!(details.reason.as_str(), "wamp.close.goodbye_and_out");

    observer.wait_for("disconnect").await;
    assert_eq!(
        observer.snapshot(),
        Vec::from_iter([
            format!("join:{REALM}"),
            "leave:wamp.close.goodbye_and_out".to_owned(),
            "disconnect".to_owned(),
        ]),
    );
}

#[tokio::test]
async fn router_initiated_goodbye_closes_session() {
    test_utils::setup::setup_test_environment();

    let observer = Arc::new(RecordingObserver::default());
    let mut peer = create_peer("router_initiated_goodbye_closes_session").unwrap();
    peer.set_observer(observer.clone());
    let mut router = connect(&peer).await;

    let (result, _) = tokio::join!(peer.join_realm(REALM), accept_join(&mut router));
    assert_matches!(result, Ok(_));

    router
        .send_message(Message::Goodbye(GoodbyeMessage {
            details: Dictionary::default(),
            reason: Uri::try_from("wamp.close.system_shutdown").unwrap(),
        }))
        .await
        .unwrap();

    // The session acknowledges the close before going away.
    let reply = router.receive_message().await.unwrap().unwrap();
    assert_matches!(reply, Message::Goodbye(message) => {
        assert_eq!(message.reason.as_str(), "wamp.close.goodbye_and_out");
    });

    observer.wait_for("disconnect").await;
    assert_eq!(
        observer.snapshot(),
        Vec::from_iter([
            format!("join:{REALM}"),
            "leave:wamp.close.system_shutdown".to_owned(),
            "disconnect".to_owned(),
        ]),
    );
}

#[tokio::test]
async fn pending_calls_fail_when_connection_drops() {
    test_utils::setup::setup_test_environment();

    let observer = Arc::new(RecordingObserver::default());
    let mut peer = create_peer("pending_calls_fail_when_connection_drops").unwrap();
    peer.set_observer(observer.clone());
    let peer = Arc::new(peer);
    let mut router = connect(&peer).await;

    let (result, _) = tokio::join!(peer.join_realm(REALM), accept_join(&mut router));
    assert_matches!(result, Ok(_));

    let mut calls = Vec::new();
    for i in 0..3 {
        let peer = peer.clone();
        calls.push(tokio::spawn(async move {
            peer.call(
                Uri::try_from(format!("com.test.slow_{i}")).unwrap(),
                RpcCall::default(),
            )
            .await
        }));
    }

    // Wait for every call to reach the router, then drop the connection
    // without responding.
    for _ in 0..3 {
        let message = router.receive_message().await.unwrap().unwrap();
        assert_matches!(message, Message::Call(_));
    }
    drop(router);

    for call in calls {
        let result = call.await.unwrap();
        assert_matches!(result, Err(err) => {
            assert!(err.downcast_ref::<SessionClosedError>().is_some());
        });
    }

    observer.wait_for("disconnect").await;
    // The session never went through a GOODBYE handshake.
    assert_eq!(
        observer.snapshot(),
        Vec::from_iter([format!("join:{REALM}"), "disconnect".to_owned()]),
    );
}

#[tokio::test]
async fn operations_fail_before_session_is_established() {
    test_utils::setup::setup_test_environment();

    let peer = create_peer("operations_fail_before_session_is_established").unwrap();
    let _router = connect(&peer).await;

    assert_matches!(
        peer.call(Uri::try_from("com.test.procedure").unwrap(), RpcCall::default()).await,
        Err(err) => {
            assert!(err.downcast_ref::<NotEstablishedError>().is_some());
        }
    );
    assert_matches!(peer.leave_realm().await, Err(err) => {
        assert!(err.downcast_ref::<NotEstablishedError>().is_some());
    });
}

#[tokio::test]
async fn operations_fail_without_connection() {
    test_utils::setup::setup_test_environment();

    let peer = create_peer("operations_fail_without_connection").unwrap();
    assert_matches!(peer.join_realm(REALM).await, Err(err) => {
        assert!(err.downcast_ref::<PeerNotConnectedError>().is_some());
    });
    assert_matches!(
        peer.call(Uri::try_from("com.test.procedure").unwrap(), RpcCall::default()).await,
        Err(err) => {
            assert!(err.downcast_ref::<PeerNotConnectedError>().is_some());
        }
    );
}

#[tokio::test]
async fn disconnect_finishes_session() {
    test_utils::setup::setup_test_environment();

    let observer = Arc::new(RecordingObserver::default());
    let mut peer = create_peer("disconnect_finishes_session").unwrap();
    peer.set_observer(observer.clone());
    let mut router = connect(&peer).await;

    let (result, _) = tokio::join!(peer.join_realm(REALM), accept_join(&mut router));
    assert_matches!(result, Ok(_));

    peer.disconnect().await.unwrap();
    observer.wait_for("disconnect").await;

    assert_matches!(peer.join_realm(REALM).await, Err(err) => {
        assert!(err.downcast_ref::<PeerNotConnectedError>().is_some());
    });
}
