//! Call setup through a running processor
//!
//! Inbound: NEW -> ACCEPT -> RINGING -> ANSWER, including the ACK-driven
//! handshake. Outbound: NEW with authentication, ACCEPT, RINGING, ANSWER.

mod common;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use common::{LOCAL_CALL, Peer, peer_address, released, test_config};
use parking_lot::Mutex;
use rvoip_iax2_core::frame::ies::{AuthMethods, EncryptionMethods, cause_code};
use rvoip_iax2_core::prelude::*;

#[tokio::test(start_paused = true)]
async fn test_inbound_new_is_acked_then_accepted() {
    let mut peer = Peer::start(test_config(), CallRole::Answering);

    let new = peer.new_call();
    peer.deliver(new.clone()).await;

    peer.expect_ack_of(&new).await;
    let accept = peer.expect_command(ProtocolCommand::Accept).await;
    assert_eq!(accept.ies.format, Some(CodecFormat::ULAW.bits()));
    assert_eq!(accept.remote.source_call_number, LOCAL_CALL);
    assert_eq!(accept.remote.dest_call_number, common::REMOTE_CALL);
    assert_eq!(accept.sequence.out_seq, 0);

    match peer.next_event().await {
        CallEvent::IncomingCall {
            calling_number,
            called_number,
            ..
        } => {
            assert_eq!(calling_number.as_deref(), Some("200"));
            assert_eq!(called_number.as_deref(), Some("100"));
        }
        other => panic!("expected IncomingCall, got {:?}", other),
    }

    peer.wait_for(|s| s.newed).await;
    let state = peer.handle.state();
    assert!(!state.accepted, "accepted only once the ACCEPT is acknowledged");
    assert_eq!(state.selected_codec, Some(CodecFormat::ULAW));
}

#[tokio::test(start_paused = true)]
async fn test_accept_ack_sends_ringing() {
    let mut peer = Peer::start(test_config(), CallRole::Answering);
    let ringing = peer.accept_inbound_call().await;

    assert!(ringing.kind == FrameKind::Control(SessionControl::Ringing));
    peer.wait_for(|s| s.sent_ringing).await;
    let state = peer.handle.state();
    assert!(state.accepted);
    assert!(!state.answered);
    assert!(!state.terminating);

    let events = peer.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        CallEvent::Accepted {
            codec: Some(CodecFormat::ULAW),
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_local_answer_establishes_on_ack() {
    let mut peer = Peer::start(test_config(), CallRole::Answering);
    let ringing = peer.accept_inbound_call().await;
    peer.deliver(peer.ack(&ringing)).await;

    peer.handle.answer().await.unwrap();
    let answer = peer.expect(FrameKind::Control(SessionControl::Answer)).await;
    peer.expect_silence().await;
    assert!(!peer.handle.state().answered, "answered only after the ACK");

    peer.deliver(peer.ack(&answer)).await;
    peer.wait_for(|s| s.answered).await;

    // The same ACK again changes nothing
    peer.deliver(peer.ack(&answer)).await;
    peer.expect_silence().await;

    let established = peer
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, CallEvent::Established { .. }))
        .count();
    assert_eq!(established, 1);
}

#[tokio::test(start_paused = true)]
async fn test_early_answer_skips_ringing() {
    let mut peer = Peer::start(test_config(), CallRole::Answering);
    let new = peer.new_call();
    peer.deliver(new.clone()).await;
    peer.expect_ack_of(&new).await;
    let accept = peer.expect_command(ProtocolCommand::Accept).await;

    peer.handle.answer().await.unwrap();
    peer.expect_silence().await;

    peer.deliver(peer.ack(&accept)).await;
    let answer = peer.expect(FrameKind::Control(SessionControl::Answer)).await;
    peer.deliver(peer.ack(&answer)).await;
    peer.wait_for(|s| s.answered).await;
    assert!(!peer.handle.state().sent_ringing);
}

#[tokio::test(start_paused = true)]
async fn test_ack_with_wrong_coordinates_is_ignored() {
    let mut peer = Peer::start(test_config(), CallRole::Answering);
    let new = peer.new_call();
    peer.deliver(new.clone()).await;
    peer.expect_ack_of(&new).await;
    let accept = peer.expect_command(ProtocolCommand::Accept).await;

    let wrong = peer.ack(&accept).with_timestamp(accept.timestamp.wrapping_add(7));
    peer.deliver(wrong).await;
    peer.expect_silence().await;
    assert!(!peer.handle.state().accepted);

    peer.deliver(peer.ack(&accept)).await;
    peer.expect(FrameKind::Control(SessionControl::Ringing)).await;
}

#[tokio::test(start_paused = true)]
async fn test_new_without_common_codec_is_rejected() {
    let mut peer = Peer::start(test_config(), CallRole::Answering);
    let ies = InformationElements {
        format: Some(CodecFormat::SPEEX.bits()),
        capability: Some(CodecSet::EMPTY.with(CodecFormat::SPEEX)),
        ..Default::default()
    };
    let new = peer.command(ProtocolCommand::New).with_ies(ies);
    peer.deliver(new.clone()).await;

    peer.expect_ack_of(&new).await;
    let reject = peer.expect_command(ProtocolCommand::Reject).await;
    assert_eq!(reject.ies.cause.as_deref(), Some("Unable to negotiate codec"));
    assert_eq!(
        reject.ies.cause_code,
        Some(cause_code::BEARER_CAPABILITY_NOT_AVAIL)
    );

    let (mut outbound, mut events) = peer.finished().await;
    assert!(outbound.try_recv().is_err());
    let mut reasons = Vec::new();
    while let Ok(event) = events.try_recv() {
        reasons.push(event);
    }
    assert_eq!(
        common::released(&reasons),
        vec![ReleaseReason::CapabilityExchange]
    );
}

#[tokio::test(start_paused = true)]
async fn test_originate_through_answer() {
    let mut peer = Peer::start(test_config(), CallRole::Originating);
    peer.handle
        .originate(OutgoingCall::new(peer_address(), "300").with_context("default"))
        .await
        .unwrap();

    let new = peer.expect_command(ProtocolCommand::New).await;
    assert_eq!(new.remote.dest_call_number, 0);
    assert_eq!(new.ies.version, Some(2));
    assert_eq!(new.ies.called_number.as_deref(), Some("300"));
    assert_eq!(new.ies.called_context.as_deref(), Some("default"));
    assert_eq!(new.ies.calling_number.as_deref(), Some("100"));
    assert_eq!(new.ies.username.as_deref(), Some("alice"));
    assert_eq!(new.ies.format, Some(CodecFormat::ULAW.bits()));

    let accept = peer.command(ProtocolCommand::Accept).with_ies(InformationElements {
        format: Some(CodecFormat::ULAW.bits()),
        ..Default::default()
    });
    peer.deliver(accept.clone()).await;
    peer.expect_ack_of(&accept).await;
    peer.wait_for(|s| s.accepted).await;

    let ringing = peer.frame(FrameKind::Control(SessionControl::Ringing));
    peer.deliver(ringing.clone()).await;
    peer.expect_ack_of(&ringing).await;

    let answer = peer.frame(FrameKind::Control(SessionControl::Answer));
    peer.deliver(answer.clone()).await;
    peer.expect_ack_of(&answer).await;
    peer.wait_for(|s| s.answered).await;

    let events = peer.drain_events();
    assert!(matches!(events[0], CallEvent::Accepted { codec: Some(CodecFormat::ULAW), .. }));
    assert!(matches!(events[1], CallEvent::RemoteRinging { .. }));
    assert!(matches!(events[2], CallEvent::Established { .. }));
    assert_eq!(events.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_outbound_frames_learn_remote_call_number() {
    let mut peer = Peer::start(test_config(), CallRole::Originating);
    peer.handle
        .originate(OutgoingCall::new(peer_address(), "300"))
        .await
        .unwrap();
    peer.expect_command(ProtocolCommand::New).await;

    let accept = peer.command(ProtocolCommand::Accept).with_ies(InformationElements {
        format: Some(CodecFormat::ULAW.bits()),
        ..Default::default()
    });
    peer.deliver(accept.clone()).await;
    let ack = peer.expect_ack_of(&accept).await;
    assert_eq!(ack.remote.dest_call_number, common::REMOTE_CALL);
    assert_eq!(ack.sequence.out_seq, accept.sequence.out_seq);

    peer.handle.send_dtmf("5").await.unwrap();
    let dtmf = peer.expect(FrameKind::Dtmf('5')).await;
    assert_eq!(dtmf.remote.dest_call_number, common::REMOTE_CALL);
    assert_eq!(dtmf.sequence.out_seq, 1, "the ACK did not consume a sequence number");
}

#[tokio::test(start_paused = true)]
async fn test_md5_challenge_is_answered() {
    let mut peer = Peer::start_with(test_config(), CallRole::Originating, |c| {
        c.with_authenticator(Arc::new(Md5Authenticator::new("secret")))
    });
    peer.handle
        .originate(OutgoingCall::new(peer_address(), "300"))
        .await
        .unwrap();
    peer.expect_command(ProtocolCommand::New).await;

    let authreq = peer.command(ProtocolCommand::AuthReq).with_ies(InformationElements {
        username: Some("alice".into()),
        auth_methods: Some(AuthMethods::MD5),
        challenge: Some("1234".into()),
        ..Default::default()
    });
    peer.deliver(authreq.clone()).await;
    peer.expect_ack_of(&authreq).await;

    let authrep = peer.expect_command(ProtocolCommand::AuthRep).await;
    assert_eq!(
        authrep.ies.md5_result.as_deref(),
        Some("10b168cd4f742410888c3c110f7a7e71")
    );
    peer.wait_for(|s| s.authorised).await;

    peer.deliver(peer.ack(&authrep)).await;
    let accept = peer.command(ProtocolCommand::Accept).with_ies(InformationElements {
        format: Some(CodecFormat::ULAW.bits()),
        ..Default::default()
    });
    peer.deliver(accept.clone()).await;
    peer.expect_ack_of(&accept).await;
    peer.wait_for(|s| s.accepted).await;
}

#[tokio::test(start_paused = true)]
async fn test_unusable_challenge_sends_inval() {
    let mut peer = Peer::start_with(test_config(), CallRole::Originating, |c| {
        c.with_authenticator(Arc::new(Md5Authenticator::new("secret")))
    });
    peer.handle
        .originate(OutgoingCall::new(peer_address(), "300"))
        .await
        .unwrap();
    peer.expect_command(ProtocolCommand::New).await;

    let authreq = peer.command(ProtocolCommand::AuthReq).with_ies(InformationElements {
        auth_methods: Some(AuthMethods::RSA),
        challenge: Some("1234".into()),
        ..Default::default()
    });
    peer.deliver(authreq.clone()).await;
    peer.expect_ack_of(&authreq).await;
    peer.expect_command(ProtocolCommand::Inval).await;

    let (_, mut events) = peer.finished().await;
    let mut all = Vec::new();
    while let Ok(event) = events.try_recv() {
        all.push(event);
    }
    assert_eq!(
        common::released(&all),
        vec![ReleaseReason::AuthenticationFailed]
    );
}

#[tokio::test(start_paused = true)]
async fn test_accept_with_unusable_codec_hangs_up() {
    let mut peer = Peer::start(test_config(), CallRole::Originating);
    peer.handle
        .originate(OutgoingCall::new(peer_address(), "300"))
        .await
        .unwrap();
    peer.expect_command(ProtocolCommand::New).await;

    let accept = peer.command(ProtocolCommand::Accept).with_ies(InformationElements {
        format: Some(CodecFormat::G729.bits()),
        capability: Some(CodecSet::EMPTY.with(CodecFormat::G729)),
        ..Default::default()
    });
    peer.deliver(accept.clone()).await;
    peer.expect_ack_of(&accept).await;
    let hangup = peer.expect_command(ProtocolCommand::Hangup).await;
    assert_eq!(hangup.ies.cause.as_deref(), Some("Unable to negotiate codec"));
    assert_eq!(
        hangup.ies.cause_code,
        Some(cause_code::BEARER_CAPABILITY_NOT_AVAIL)
    );
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_commands_get_unsupport() {
    let mut peer = Peer::start(test_config(), CallRole::Answering);
    peer.accept_inbound_call().await;

    let dpreq = peer.command(ProtocolCommand::DpReq);
    peer.deliver(dpreq.clone()).await;
    peer.expect_ack_of(&dpreq).await;
    let reply = peer.expect_command(ProtocolCommand::Unsupport).await;
    assert_eq!(reply.ies.unknown_command, Some(ProtocolCommand::DpReq.as_u8()));

    let txreq = peer.command(ProtocolCommand::TxReq);
    peer.deliver(txreq.clone()).await;
    peer.expect_ack_of(&txreq).await;
    peer.expect_command(ProtocolCommand::TxRej).await;

    assert!(!peer.handle.state().terminating);
}

#[tokio::test(start_paused = true)]
async fn test_registration_completes_on_regack() {
    let mut peer = Peer::start_with(test_config(), CallRole::Registration, |c| {
        c.with_authenticator(Arc::new(Md5Authenticator::new("secret")))
    });
    peer.handle
        .register(Registration::new(peer_address(), "alice").with_refresh(60))
        .await
        .unwrap();

    let regreq = peer.expect_command(ProtocolCommand::RegReq).await;
    assert_eq!(regreq.ies.username.as_deref(), Some("alice"));
    assert_eq!(regreq.ies.refresh, Some(60));

    let regauth = peer.command(ProtocolCommand::RegAuth).with_ies(InformationElements {
        username: Some("alice".into()),
        auth_methods: Some(AuthMethods::MD5),
        challenge: Some("1234".into()),
        ..Default::default()
    });
    peer.deliver(regauth.clone()).await;
    peer.expect_ack_of(&regauth).await;
    let answered = peer.expect_command(ProtocolCommand::RegReq).await;
    assert_eq!(
        answered.ies.md5_result.as_deref(),
        Some("10b168cd4f742410888c3c110f7a7e71")
    );
    assert_eq!(answered.ies.refresh, Some(60));

    let regack = peer.command(ProtocolCommand::RegAck).with_ies(InformationElements {
        refresh: Some(60),
        ..Default::default()
    });
    peer.deliver(regack.clone()).await;
    peer.expect_ack_of(&regack).await;
    peer.wait_for(|s| s.registered).await;
    assert!(matches!(
        peer.next_event().await,
        CallEvent::Registered { refresh: Some(60), .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_registration_rejected() {
    let mut peer = Peer::start(test_config(), CallRole::Registration);
    peer.handle
        .register(Registration::new(peer_address(), "alice"))
        .await
        .unwrap();
    peer.expect_command(ProtocolCommand::RegReq).await;

    let regrej = peer.command(ProtocolCommand::RegRej).with_ies(InformationElements::with_cause(
        "Registration refused",
        Some(cause_code::CALL_REJECTED),
    ));
    peer.deliver(regrej.clone()).await;
    peer.expect_ack_of(&regrej).await;

    let (mut outbound, mut events) = peer.finished().await;
    assert!(outbound.try_recv().is_err());
    let all: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert_eq!(released(&all), vec![ReleaseReason::RegistrationRejected]);
}

const SEALED: &[u8] = b"sealed:";

/// What the test cipher saw
#[derive(Debug, Default)]
struct CipherLog {
    key: Option<String>,
    encrypted: Vec<FrameKind>,
    decrypted: Vec<FrameKind>,
}

/// Cipher that tags payloads with a prefix and records every call
struct RecordingCipher {
    log: Arc<Mutex<CipherLog>>,
    fail_encrypt: bool,
}

impl RecordingCipher {
    fn new(fail_encrypt: bool) -> (Self, Arc<Mutex<CipherLog>>) {
        let log = Arc::new(Mutex::new(CipherLog::default()));
        (
            Self {
                log: log.clone(),
                fail_encrypt,
            },
            log,
        )
    }
}

impl FrameCipher for RecordingCipher {
    fn set_key(&mut self, key: &str) -> Result<()> {
        self.log.lock().key = Some(key.to_string());
        Ok(())
    }

    fn encrypt(&self, frame: &mut FullFrame) -> Result<()> {
        if self.fail_encrypt {
            return Err(Iax2Error::encryption("cipher rejected frame"));
        }
        self.log.lock().encrypted.push(frame.kind);
        frame.payload = seal(&frame.payload);
        Ok(())
    }

    fn decrypt(&self, frame: &mut FullFrame) -> Result<()> {
        if !frame.payload.starts_with(SEALED) {
            return Err(Iax2Error::encryption("frame not sealed"));
        }
        self.log.lock().decrypted.push(frame.kind);
        frame.payload = frame.payload.slice(SEALED.len()..);
        Ok(())
    }
}

fn seal(payload: &[u8]) -> Bytes {
    let mut sealed = BytesMut::from(SEALED);
    sealed.extend_from_slice(payload);
    sealed.freeze()
}

fn sealed(frame: FullFrame) -> FullFrame {
    let payload = seal(&frame.payload);
    frame.with_payload(payload)
}

/// Originate and answer an AUTHREQ that offers AES, up to the AUTHREP
async fn authenticate_with_encryption(peer: &mut Peer) -> FullFrame {
    peer.handle
        .originate(OutgoingCall::new(peer_address(), "300"))
        .await
        .unwrap();
    peer.expect_command(ProtocolCommand::New).await;

    let authreq = peer.command(ProtocolCommand::AuthReq).with_ies(InformationElements {
        username: Some("alice".into()),
        auth_methods: Some(AuthMethods::MD5),
        challenge: Some("1234".into()),
        encryption: Some(EncryptionMethods::AES128),
        ..Default::default()
    });
    peer.deliver(authreq.clone()).await;
    peer.expect_ack_of(&authreq).await;
    let authrep = peer.expect_command(ProtocolCommand::AuthRep).await;
    peer.wait_for(|s| s.encryption_enabled).await;
    authrep
}

fn encrypting_peer(fail_encrypt: bool) -> (Peer, Arc<Mutex<CipherLog>>) {
    let (cipher, log) = RecordingCipher::new(fail_encrypt);
    let peer = Peer::start_with(
        test_config().with_encryption(true),
        CallRole::Originating,
        |c| {
            c.with_authenticator(Arc::new(Md5Authenticator::new("secret")))
                .with_cipher(Box::new(cipher))
        },
    );
    (peer, log)
}

#[tokio::test(start_paused = true)]
async fn test_encryption_keyed_from_auth_reply() {
    let (mut peer, log) = encrypting_peer(false);
    let authrep = authenticate_with_encryption(&mut peer).await;

    // The AUTHREP itself goes out in the clear; the key comes from its MD5 result
    assert!(authrep.payload.is_empty());
    assert_eq!(
        log.lock().key.as_deref(),
        Some("10b168cd4f742410888c3c110f7a7e71")
    );
    assert!(log.lock().encrypted.is_empty());

    peer.deliver(sealed(peer.ack(&authrep))).await;
    let accept = sealed(peer.command(ProtocolCommand::Accept).with_ies(InformationElements {
        format: Some(CodecFormat::ULAW.bits()),
        ..Default::default()
    }));
    peer.deliver(accept.clone()).await;
    let ack = peer.expect_ack_of(&accept).await;
    assert_eq!(ack.payload, Bytes::from_static(SEALED));
    peer.wait_for(|s| s.accepted).await;

    let text = sealed(peer.frame(FrameKind::Text).with_payload(Bytes::from_static(b"hello")));
    peer.deliver(text.clone()).await;
    peer.expect_ack_of(&text).await;

    // A frame that does not decrypt is dropped without an ACK
    let plain = peer.frame(FrameKind::Text).with_payload(Bytes::from_static(b"plain"));
    peer.deliver(plain).await;
    peer.expect_silence().await;

    let texts: Vec<String> = peer
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            CallEvent::Text { text, .. } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["hello".to_string()]);

    let log = log.lock();
    assert_eq!(
        log.decrypted,
        vec![
            FrameKind::Protocol(ProtocolCommand::Ack),
            FrameKind::Protocol(ProtocolCommand::Accept),
            FrameKind::Text,
        ]
    );
    assert_eq!(
        log.encrypted,
        vec![
            FrameKind::Protocol(ProtocolCommand::Ack),
            FrameKind::Protocol(ProtocolCommand::Ack),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_encryption_failure_ends_call() {
    let (mut peer, _log) = encrypting_peer(true);
    authenticate_with_encryption(&mut peer).await;

    let accept = sealed(peer.command(ProtocolCommand::Accept).with_ies(InformationElements {
        format: Some(CodecFormat::ULAW.bits()),
        ..Default::default()
    }));
    peer.deliver(accept).await;

    let (outbound, events) = peer.finished().await;
    let frames: Vec<_> = {
        let mut outbound = outbound;
        std::iter::from_fn(|| outbound.try_recv().ok()).collect()
    };
    // Neither the ACK nor the HANGUP could be encrypted, so nothing left
    assert!(frames.is_empty(), "{:?}", frames);

    let all: Vec<_> = {
        let mut events = events;
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    };
    assert_eq!(released(&all), vec![ReleaseReason::EncryptionFailed]);
}
