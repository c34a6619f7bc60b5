    use super::*;
    use crate::auth::{TokenCodec, TokenType};
    use crate::error::{Error, ErrorKind};
    use crate::event_bus::{Notification, NotificationBus, ServerEvent, Subscription};
    use crate::models::{MessageContent, Role, User};
    use crate::store::Store;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        store: Store,
        bus: NotificationBus,
        codec: Arc<TokenCodec>,
        auth: AuthService,
        users: UserService,
        channels: ChannelService,
        admin: AdminService,
    }

    async fn fixture() -> Fixture {
        let store = Store::in_memory().await.unwrap();
        let bus = NotificationBus::new();
        let codec = Arc::new(TokenCodec::new(Arc::new(store.clone()), "Whispr"));
        let auth = AuthService::new(store.clone(), codec.clone(), TokenPolicy::default());
        Fixture {
            users: UserService::new(store.clone(), auth.clone()),
            channels: ChannelService::new(store.clone(), bus.clone()),
            admin: AdminService::new(store.clone(), codec.clone()),
            store,
            bus,
            codec,
            auth,
        }
    }

    /// Inserts a user without running the password KDF.
    async fn insert_user(store: &Store, username: &str) -> String {
        let id = new_id();
        store
            .create_user(&User {
                id: id.clone(),
                username: username.to_string(),
                nickname: username.to_string(),
                password: "hash:client-salt:server-salt".to_string(),
                role: Role::User,
                banned: false,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        id
    }

    fn listen(bus: &NotificationBus) -> (Subscription, mpsc::UnboundedReceiver<(ServerEvent, Arc<Notification>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = bus.subscribe(move |event, notification| {
            let _ = tx.send((event, notification));
        });
        (subscription, rx)
    }

    async fn next_event(
        rx: &mut mpsc::UnboundedReceiver<(ServerEvent, Arc<Notification>)>,
    ) -> (ServerEvent, Arc<Notification>) {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    fn text_for(target: &str) -> MessageContent {
        MessageContent {
            target: target.to_string(),
            cipher: format!("cipher-for-{}", target),
            encrypted_symmetric_key: format!("key-for-{}", target),
        }
    }

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_register_issues_working_token() {
        let f = fixture().await;
        let (user, token) = f
            .users
            .register("alice", "Alice", "derived:client-salt")
            .await
            .unwrap();

        let verified = f.codec.verify(&token).await.unwrap();
        assert_eq!(verified.payload.sub, user.id);
        assert_eq!(verified.payload.typ, TokenType::Access);
        assert_eq!(verified.payload.ide, "global");

        assert_eq!(user.password.split(':').count(), 3);
        assert_eq!(f.users.password_salt("alice").await.unwrap(), "client-salt");
    }

    #[tokio::test]
    async fn test_register_rejects_bad_usernames() {
        let f = fixture().await;
        for username in ["ab", "has space", "way_too_long_username_here", "émile"] {
            match f.users.register(username, "Nick", "d:s").await {
                Err(Error::Validation(msg)) => assert_eq!(msg, users::USERNAME_RULES),
                other => panic!("expected validation error for {:?}, got {:?}", username, other),
            }
        }
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let f = fixture().await;
        insert_user(&f.store, "alice").await;

        match f.users.register("alice", "Alice", "d:s").await {
            Err(Error::Validation(msg)) => assert_eq!(msg, "Username already exists"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_profile_hides_private_key_from_others() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        let bob = insert_user(&f.store, "bob").await;
        f.users.set_key_pair(&alice, "sealed", "public").await.unwrap();

        let user = f.users.get_by_username("alice").await.unwrap();
        let own = f.users.profile(&user, &alice).await.unwrap();
        assert_eq!(own.public_key.as_deref(), Some("public"));
        assert_eq!(own.encrypted_private_key.as_deref(), Some("sealed"));

        let other = f.users.profile(&user, &bob).await.unwrap();
        assert_eq!(other.public_key.as_deref(), Some("public"));
        assert!(other.encrypted_private_key.is_none());
    }

    #[tokio::test]
    async fn test_key_pair_cannot_be_replaced() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        f.users.set_key_pair(&alice, "sealed", "public").await.unwrap();

        let err = f.users.set_key_pair(&alice, "other", "other").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.user_message(),
            "Specified user has already established key pair."
        );
    }

    #[tokio::test]
    async fn test_unknown_user_lookup() {
        let f = fixture().await;
        let err = f.users.get_by_username("ghost").await.unwrap_err();
        assert_eq!(err.user_message(), users::USER_NOT_FOUND);
        assert!(f.users.password_salt("ghost").await.is_err());
    }

    // ------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let f = fixture().await;
        let (user, first_token) = f.users.register("alice", "Alice", "d:s").await.unwrap();

        let signed_in = f.auth.sign_in("alice", "d:s").await.unwrap();
        assert_eq!(signed_in.id, user.id);
        assert_eq!(signed_in.nickname, "Alice");
        assert!(signed_in.public_key.is_none());
        assert!(f.codec.verify(&signed_in.token).await.is_ok());

        f.auth.sign_out(&signed_in.token).await.unwrap();
        assert!(f.codec.verify(&signed_in.token).await.is_err());
        assert!(f.codec.verify(&first_token).await.is_ok());

        let err = f.auth.sign_out(&signed_in.token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_sign_in_failures() {
        let f = fixture().await;
        f.users.register("alice", "Alice", "d:s").await.unwrap();

        let err = f.auth.sign_in("ghost", "d:s").await.unwrap_err();
        assert_eq!(err.user_message(), "User not found");

        let err = f.auth.sign_in("alice", "wrong:s").await.unwrap_err();
        assert_eq!(err.user_message(), "Incorrect password");
    }

    #[tokio::test]
    async fn test_sign_out_all() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        let t1 = f.auth.issue_user_token(&alice, TokenType::Access, "global").await.unwrap();
        let t2 = f.auth.issue_user_token(&alice, TokenType::Refresh, "global").await.unwrap();

        assert_eq!(f.auth.sign_out_all(&alice).await.unwrap(), 2);
        assert!(f.codec.verify(&t1).await.is_err());
        assert!(f.codec.verify(&t2).await.is_err());
    }

    #[test]
    fn test_token_policy_ttls() {
        let policy = TokenPolicy {
            audience: "chat.example.com".to_string(),
            access_ttl_millis: 1_000,
            refresh_ttl_millis: 2_000,
            settings_ttl_millis: 3_000,
        };
        assert_eq!(policy.ttl_millis(TokenType::Access, "global"), 1_000);
        assert_eq!(policy.ttl_millis(TokenType::Refresh, "global"), 2_000);
        assert_eq!(policy.ttl_millis(TokenType::Access, "settings"), 3_000);
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_channel_notifies_members() {
        let f = fixture().await;
        let (_sub, mut rx) = listen(&f.bus);
        let alice = insert_user(&f.store, "alice").await;
        let bob = insert_user(&f.store, "bob").await;

        let channel = f
            .channels
            .create(&alice, &[bob.clone()], Some("general"))
            .await
            .unwrap();
        assert_eq!(channel.name.as_deref(), Some("general"));
        assert_eq!(channel.members.len(), 2);

        let (event, notification) = next_event(&mut rx).await;
        assert_eq!(event, ServerEvent::ChannelCreate);
        assert_eq!(
            sorted(notification.target_ids.clone()),
            sorted(vec![alice.clone(), bob.clone()])
        );
        assert_eq!(notification.data["channel"]["id"], channel.id);

        assert_eq!(f.channels.list_for_user(&bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_channel_rules() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        let bob = insert_user(&f.store, "bob").await;

        let err = f.channels.create(&alice, &[alice.clone()], None).await.unwrap_err();
        assert_eq!(err.user_message(), "Cannot include self as recipient");

        let err = f.channels.create(&alice, &[new_id()], None).await.unwrap_err();
        assert_eq!(err.user_message(), users::USER_NOT_FOUND);

        let err = f.channels.create(&alice, &[], None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        f.channels.create(&alice, &[bob.clone()], None).await.unwrap();
        let err = f.channels.create(&bob, &[alice.clone()], None).await.unwrap_err();
        assert_eq!(err.user_message(), "Channel already exists");
    }

    #[tokio::test]
    async fn test_channel_access_requires_membership() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        let bob = insert_user(&f.store, "bob").await;
        let carol = insert_user(&f.store, "carol").await;
        let channel = f.channels.create(&alice, &[bob.clone()], None).await.unwrap();

        assert!(f.channels.get(&channel.id, &bob).await.is_ok());
        let err = f.channels.get(&channel.id, &carol).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.user_message(), "User does not have access");

        let err = f.channels.get("not-a-channel", &alice).await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid channel id");

        let perms = f.channels.permissions(&channel.id, &carol).await.unwrap();
        assert!(!perms.can_read && !perms.can_write);

        let err = f
            .channels
            .post_message(&channel.id, &carol, &[text_for(&alice)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_post_message_notifies_author_and_targets() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        let bob = insert_user(&f.store, "bob").await;
        let channel = f.channels.create(&alice, &[bob.clone()], None).await.unwrap();

        let (_sub, mut rx) = listen(&f.bus);
        let message = f
            .channels
            .post_message(&channel.id, &bob, &[text_for(&alice), text_for(&bob)])
            .await
            .unwrap();

        let (event, notification) = next_event(&mut rx).await;
        assert_eq!(event, ServerEvent::MessageCreate);
        assert_eq!(
            sorted(notification.target_ids.clone()),
            sorted(vec![alice.clone(), bob.clone()])
        );
        assert_eq!(notification.data["id"], message.id);
        assert_eq!(notification.data["channelId"], channel.id);
        assert_eq!(notification.data["author"]["id"], bob);
        assert_eq!(notification.data["content"].as_array().unwrap().len(), 2);

        let refreshed = f.channels.get(&channel.id, &alice).await.unwrap();
        assert_eq!(refreshed.last_message_id.as_deref(), Some(message.id.as_str()));
    }

    #[tokio::test]
    async fn test_message_targets_must_be_members() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        let bob = insert_user(&f.store, "bob").await;
        let mallory = insert_user(&f.store, "mallory").await;
        let channel = f.channels.create(&alice, &[bob.clone()], None).await.unwrap();

        let (_sub, mut rx) = listen(&f.bus);
        let err = f
            .channels
            .post_message(&channel.id, &alice, &[text_for(&bob), text_for(&mallory)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.user_message(), "Message target is not a channel member");
        assert!(f.channels.messages(&channel.id, &alice, 1).await.unwrap().is_empty());

        let message = f
            .channels
            .post_message(&channel.id, &alice, &[text_for(&bob)])
            .await
            .unwrap();
        let (event, _) = next_event(&mut rx).await;
        assert_eq!(event, ServerEvent::MessageCreate);

        let err = f
            .channels
            .update_message(&channel.id, &message.id, &alice, &[text_for(&mallory)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let stored = f.channels.message(&channel.id, &message.id, &bob).await.unwrap();
        assert!(stored.updated_at.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reader_sees_only_own_ciphertext() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        let bob = insert_user(&f.store, "bob").await;
        let channel = f.channels.create(&alice, &[bob.clone()], None).await.unwrap();
        let message = f
            .channels
            .post_message(&channel.id, &alice, &[text_for(&alice), text_for(&bob)])
            .await
            .unwrap();

        let for_bob = f.channels.message(&channel.id, &message.id, &bob).await.unwrap();
        let content = for_bob.content.unwrap();
        assert_eq!(content.cipher_text, format!("cipher-for-{}", bob));
        assert_eq!(for_bob.author.id, alice);

        let err = f
            .channels
            .message(&channel.id, &new_id(), &bob)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Message not found");
    }

    #[tokio::test]
    async fn test_messages_are_paged_newest_first() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        let bob = insert_user(&f.store, "bob").await;
        let channel = f.channels.create(&alice, &[bob.clone()], None).await.unwrap();

        let mut posted = Vec::new();
        for _ in 0..(MESSAGES_PER_PAGE + 1) {
            let m = f
                .channels
                .post_message(&channel.id, &alice, &[text_for(&bob)])
                .await
                .unwrap();
            posted.push(m.id);
        }

        let first = f.channels.messages(&channel.id, &bob, 1).await.unwrap();
        assert_eq!(first.len() as i64, MESSAGES_PER_PAGE);
        assert_eq!(first[0].id, *posted.last().unwrap());

        let second = f.channels.messages(&channel.id, &bob, 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, posted[0]);

        // Pages below one are treated as the first page
        let zeroth = f.channels.messages(&channel.id, &bob, 0).await.unwrap();
        assert_eq!(zeroth.len() as i64, MESSAGES_PER_PAGE);
    }

    #[tokio::test]
    async fn test_update_message_by_author_only() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        let bob = insert_user(&f.store, "bob").await;
        let channel = f.channels.create(&alice, &[bob.clone()], None).await.unwrap();
        let message = f
            .channels
            .post_message(&channel.id, &alice, &[text_for(&bob)])
            .await
            .unwrap();

        let err = f
            .channels
            .update_message(&channel.id, &message.id, &bob, &[text_for(&alice)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let (_sub, mut rx) = listen(&f.bus);
        let edit = MessageContent {
            cipher: "edited".to_string(),
            ..text_for(&bob)
        };
        let updated = f
            .channels
            .update_message(&channel.id, &message.id, &alice, &[edit])
            .await
            .unwrap();
        assert!(updated.edited_at.is_some());

        let (event, notification) = next_event(&mut rx).await;
        assert_eq!(event, ServerEvent::MessageUpdate);
        assert!(notification.targets(&bob));

        let view = f.channels.message(&channel.id, &message.id, &bob).await.unwrap();
        assert_eq!(view.content.unwrap().cipher_text, "edited");
        assert!(view.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_message_notifies_all_members() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;
        let bob = insert_user(&f.store, "bob").await;
        let carol = insert_user(&f.store, "carol").await;
        let channel = f
            .channels
            .create(&alice, &[bob.clone(), carol.clone()], None)
            .await
            .unwrap();
        let message = f
            .channels
            .post_message(&channel.id, &alice, &[text_for(&bob)])
            .await
            .unwrap();

        assert!(f
            .channels
            .delete_message(&channel.id, &message.id, &bob)
            .await
            .is_err());

        let (_sub, mut rx) = listen(&f.bus);
        f.channels
            .delete_message(&channel.id, &message.id, &alice)
            .await
            .unwrap();

        let (event, notification) = next_event(&mut rx).await;
        assert_eq!(event, ServerEvent::MessageDelete);
        assert_eq!(
            sorted(notification.target_ids.clone()),
            sorted(vec![alice.clone(), bob.clone(), carol.clone()])
        );
        assert!(f
            .channels
            .message(&channel.id, &message.id, &alice)
            .await
            .is_err());
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_require_admin() {
        let f = fixture().await;
        let alice = insert_user(&f.store, "alice").await;

        let err = f.admin.require_admin(&alice).await.unwrap_err();
        assert_eq!(err.user_message(), "User is not an admin");

        f.store.set_user_role(&alice, Role::Admin).await.unwrap();
        f.admin.require_admin(&alice).await.unwrap();

        let err = f.admin.role("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_ban_revokes_tokens_and_blocks_sign_in() {
        let f = fixture().await;
        let (user, token) = f.users.register("mallory", "Mallory", "d:s").await.unwrap();

        let banned_id = f.admin.ban("mallory").await.unwrap();
        assert_eq!(banned_id, user.id);
        assert!(f.codec.verify(&token).await.is_err());
        assert_eq!(f.store.count_tokens_for_user(&user.id).await.unwrap(), 0);

        let err = f.auth.sign_in("mallory", "d:s").await.unwrap_err();
        assert_eq!(err.user_message(), "User is banned");

        f.admin.unban("mallory").await.unwrap();
        assert!(f.auth.sign_in("mallory", "d:s").await.is_ok());

        assert!(f.admin.ban("ghost").await.is_err());
    }
