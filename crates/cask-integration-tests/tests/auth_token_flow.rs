//! Integration test: registration, login, and token lifecycle.
//!
//! Exercises the full credential path without a running daemon process:
//! 1. Start and complete a registration with client-derived verifiers
//! 2. Start and complete a login, verifying the server signature
//! 3. Use the issued access token against the token service
//! 4. Rotate the refresh token; replay the spent one
//! 5. Race concurrent rotations of one token (single winner)
//! 6. Revoke and observe the revocation

use std::sync::Arc;

use cask_daemon::service::auth::{CompleteLoginParams, CompleteRegistrationParams};
use cask_daemon::service::{AuthService, ServiceError, TokenService};
use cask_daemon::Db;
use cask_scram::client;
use cask_token::TokenManager;
use cask_types::user::KdfParams;

fn test_kdf() -> KdfParams {
    KdfParams {
        time: 1,
        mem_kib: 1024,
        parallelism: 1,
    }
}

fn build_services() -> (AuthService, Arc<TokenService>) {
    let conn = cask_db::open_memory().expect("open db");
    let db: Db = Arc::new(tokio::sync::Mutex::new(conn));
    let tokens = Arc::new(TokenService::new(
        db.clone(),
        TokenManager::new(b"integration-secret".to_vec()),
    ));
    (AuthService::new(db, tokens.clone(), test_kdf()), tokens)
}

struct Session {
    access: String,
    refresh: String,
}

async fn register_and_login(
    auth: &AuthService,
    login: &str,
    passphrase: &[u8],
) -> Session {
    let offer = auth.start_registration(login).await.expect("start registration");
    assert!(offer.salt_root.len() >= 16);

    let verifiers =
        client::derive_verifiers(passphrase, &offer.salt_root, &offer.kdf).expect("derive");
    auth.complete_registration(CompleteRegistrationParams {
        session_id: offer.session_id,
        login: login.to_string(),
        salt_root: offer.salt_root.clone(),
        kdf: offer.kdf,
        stored_key: verifiers.stored_key.to_vec(),
        server_key: verifiers.server_key.to_vec(),
    })
    .await
    .expect("complete registration");

    let client_nonce = vec![0x01u8; 16];
    let start = auth.start_login(login, &client_nonce).await.expect("start login");
    assert!(start.server_nonce.len() >= 16);
    assert_eq!(start.salt_root, offer.salt_root);
    assert_eq!(start.kdf, offer.kdf);

    let message = cask_scram::message::auth_message(login, &client_nonce, &start.server_nonce);
    let proof =
        client::client_proof(passphrase, &start.salt_root, &start.kdf, &message).expect("proof");

    let session = auth
        .complete_login(CompleteLoginParams {
            session_id: start.session_id,
            login: login.to_string(),
            client_nonce: client_nonce.clone(),
            server_nonce: start.server_nonce.clone(),
            client_proof: proof.to_vec(),
        })
        .await
        .expect("complete login");

    // The client can verify it talked to the real key holder.
    let expected =
        client::expected_server_signature(passphrase, &start.salt_root, &start.kdf, &message)
            .expect("expected signature");
    assert_eq!(session.server_signature, expected.to_vec());

    Session {
        access: session.access_token,
        refresh: session.refresh_token,
    }
}

#[tokio::test]
async fn register_login_roundtrip_issues_usable_tokens() {
    let (auth, tokens) = build_services();
    let session = register_and_login(&auth, "a@b.c", b"hunter2").await;

    assert!(!session.access.is_empty());
    assert!(!session.refresh.is_empty());

    // The access token resolves to a real user id.
    let user_id = tokens.authenticate(&session.access).expect("authenticate");
    assert!(!user_id.is_nil());
}

#[tokio::test]
async fn refresh_rotation_blocks_replay_and_keeps_successor() {
    let (auth, tokens) = build_services();
    let session = register_and_login(&auth, "rotate@b.c", b"pw").await;

    let (_, r1) = tokens.refresh(&session.refresh).await.expect("rotate once");
    assert_ne!(session.refresh, r1);

    let err = tokens.refresh(&session.refresh).await.expect_err("replay");
    assert!(matches!(err, ServiceError::TokenRevoked));

    // Reuse detection revoked the whole family, successor included.
    let err = tokens.refresh(&r1).await.expect_err("family revoked");
    assert!(matches!(err, ServiceError::TokenRevoked));
}

#[tokio::test]
async fn concurrent_rotations_converge_to_one_winner() {
    let (auth, tokens) = build_services();
    let session = register_and_login(&auth, "race@b.c", b"pw").await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let tokens = tokens.clone();
        let presented = session.refresh.clone();
        tasks.push(tokio::spawn(async move { tokens.refresh(&presented).await }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await.expect("join") {
            Ok(_) => winners += 1,
            Err(ServiceError::TokenRevoked) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn revoked_token_stays_revoked() {
    let (auth, tokens) = build_services();
    let session = register_and_login(&auth, "revoke@b.c", b"pw").await;

    tokens.revoke(&session.refresh).await.expect("revoke");
    assert!(matches!(
        tokens.refresh(&session.refresh).await.expect_err("spent"),
        ServiceError::TokenRevoked
    ));

    // Revocation is idempotent at the wire surface.
    tokens.revoke(&session.refresh).await.expect("second revoke");
}

#[tokio::test]
async fn two_accounts_do_not_interfere() {
    let (auth, tokens) = build_services();
    let alice = register_and_login(&auth, "alice@b.c", b"alice-pw").await;
    let bob = register_and_login(&auth, "bob@b.c", b"bob-pw").await;

    let alice_id = tokens.authenticate(&alice.access).expect("alice");
    let bob_id = tokens.authenticate(&bob.access).expect("bob");
    assert_ne!(alice_id, bob_id);

    // Revoking Alice's refresh token leaves Bob's working.
    tokens.revoke(&alice.refresh).await.expect("revoke alice");
    tokens.refresh(&bob.refresh).await.expect("bob still rotates");
}
