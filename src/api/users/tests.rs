use super::*;
use crate::api::test_support::{register as register_user, test_state};
use crate::server::config::RuntimeEnv;

fn key_pair() -> UpdateKeyPairRequest {
    UpdateKeyPairRequest {
        encrypted_private_key: "sealed-private".to_string(),
        public_key: "public".to_string(),
    }
}

#[tokio::test]
async fn test_register_returns_created() {
    let state = test_state(RuntimeEnv::Development).await;

    let (status, Json(body)) = register(
        State(state.clone()),
        ApiJson(RegisterRequest {
            username: "alice".to_string(),
            nickname: "Alice".to_string(),
            password: "derived:client-salt".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    let verified = state.codec.verify(&body.token).await.unwrap();
    assert_eq!(verified.payload.sub, body.id);
}

#[tokio::test]
async fn test_register_rejects_bad_username() {
    let state = test_state(RuntimeEnv::Development).await;

    let err = register(
        State(state),
        ApiJson(RegisterRequest {
            username: "a b".to_string(),
            nickname: "Alice".to_string(),
            password: "derived:client-salt".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_user_self_alias_includes_private_key() {
    let state = test_state(RuntimeEnv::Development).await;
    let (alice, session) = register_user(&state, "alice").await;
    update_key_pair(State(state.clone()), session, ApiJson(key_pair()))
        .await
        .unwrap();

    let (_, session) = register_user(&state, "alice2").await;
    let Json(other) = get_user(
        State(state.clone()),
        session,
        ApiPath("alice".to_string()),
    )
    .await
    .unwrap();
    assert_eq!(other.id, alice.id);
    assert_eq!(other.public_key.as_deref(), Some("public"));
    assert!(other.encrypted_private_key.is_none());

    let signed_in = state
        .auth
        .sign_in("alice", "derived:client-salt")
        .await
        .unwrap();
    let session = RequireSession(crate::middleware::auth::AuthSession {
        user_id: signed_in.id,
        token: signed_in.token,
    });
    let Json(own) = get_user(State(state), session, ApiPath(SELF_ALIAS.to_string()))
        .await
        .unwrap();
    assert_eq!(own.username, "alice");
    assert_eq!(own.encrypted_private_key.as_deref(), Some("sealed-private"));
}

#[tokio::test]
async fn test_key_pair_is_set_once() {
    let state = test_state(RuntimeEnv::Development).await;
    let (_, session) = register_user(&state, "alice").await;
    let again = RequireSession(session.0.clone());

    update_key_pair(State(state.clone()), session, ApiJson(key_pair()))
        .await
        .unwrap();
    let err = update_key_pair(State(state), again, ApiJson(key_pair()))
        .await
        .unwrap_err();
    assert_eq!(
        err.message(),
        "Specified user has already established key pair."
    );
}

#[tokio::test]
async fn test_password_salt() {
    let state = test_state(RuntimeEnv::Development).await;
    register_user(&state, "alice").await;

    let Json(body) = get_password_salt(State(state.clone()), ApiPath("alice".to_string()))
        .await
        .unwrap();
    assert_eq!(body.salt, "client-salt");

    let err = get_password_salt(State(state), ApiPath("nobody".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_and_list_channels() {
    let state = test_state(RuntimeEnv::Development).await;
    let (alice, alice_session) = register_user(&state, "alice").await;
    let (bob, bob_session) = register_user(&state, "bob").await;

    let (status, Json(channel)) = create_channel(
        State(state.clone()),
        alice_session,
        ApiJson(CreateChannelRequest {
            recipients: vec![bob.id.clone()],
            name: Some("general".to_string()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(channel.name.as_deref(), Some("general"));
    assert_eq!(channel.members.len(), 2);
    assert!(channel.members.iter().any(|m| m.id == alice.id));

    let Json(channels) = list_channels(State(state), bob_session).await.unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].id, channel.id);
}
