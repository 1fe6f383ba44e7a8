//! End-to-end dispatch flows against in-memory fakes: policy denials,
//! online/offline selection, offline set algebra and the web/PC
//! background wake retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use push_service::cache::{
    ConversationCache, GroupCache, GroupInfo, GroupMemberInfo, RecvMsgOpt, RelationCache,
    GROUP_TYPE_SUPER,
};
use push_service::config::Config;
use push_service::context::RequestContext;
use push_service::error::{AppError, AppResult};
use push_service::gateway::OnlinePusher;
use push_service::models::content_type as ct;
use push_service::models::message as session;
use push_service::models::options;
use push_service::models::platform;
use push_service::pb::{
    MsgData, OfflinePushInfo, SingleMsgToUserPlatform, SingleMsgToUserResultList,
};
use push_service::services::callback::CallbackBus;
use push_service::services::offline_push::OfflinePusher;
use push_service::services::push_format::PushOpts;
use push_service::services::pusher::Pusher;
use push_service::services::validation::MessageRevoked;
use push_service::storage::{MsgReader, PushStorage};

#[derive(Debug, Clone)]
struct OnlineCall {
    user_ids: Vec<String>,
    msg: MsgData,
}

#[derive(Default)]
struct ScriptedOnline {
    responses: Mutex<Vec<Vec<SingleMsgToUserResultList>>>,
    calls: Mutex<Vec<OnlineCall>>,
}

impl ScriptedOnline {
    fn with_responses(responses: Vec<Vec<SingleMsgToUserResultList>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<OnlineCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OnlinePusher for ScriptedOnline {
    async fn batch_push(
        &self,
        _ctx: &RequestContext,
        msg: &MsgData,
        user_ids: &[String],
    ) -> AppResult<Vec<SingleMsgToUserResultList>> {
        self.calls.lock().unwrap().push(OnlineCall {
            user_ids: user_ids.to_vec(),
            msg: msg.clone(),
        });
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(responses.remove(0))
        }
    }
}

#[derive(Debug, Clone)]
struct OfflineCall {
    user_ids: Vec<String>,
    title: String,
    body: String,
    opts: PushOpts,
}

#[derive(Default)]
struct RecordingOffline {
    calls: Mutex<Vec<OfflineCall>>,
}

impl RecordingOffline {
    fn calls(&self) -> Vec<OfflineCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OfflinePusher for RecordingOffline {
    async fn push(
        &self,
        _ctx: &RequestContext,
        user_ids: &[String],
        title: &str,
        body: &str,
        opts: &PushOpts,
    ) -> AppResult<()> {
        self.calls.lock().unwrap().push(OfflineCall {
            user_ids: user_ids.to_vec(),
            title: title.to_string(),
            body: body.to_string(),
            opts: opts.clone(),
        });
        Ok(())
    }
}

#[derive(Default)]
struct FakeStorage {
    invite_calls: Mutex<usize>,
}

#[async_trait]
impl PushStorage for FakeStorage {
    async fn handle_signal_invite(
        &self,
        _ctx: &RequestContext,
        _msg: &MsgData,
        _push_to_user_id: &str,
    ) -> AppResult<bool> {
        *self.invite_calls.lock().unwrap() += 1;
        Ok(true)
    }
}

#[derive(Default)]
struct FakeCacheHub {
    black: HashMap<String, Vec<String>>,
    members: HashMap<String, Vec<String>>,
    member_info: HashMap<(String, String), GroupMemberInfo>,
    groups: HashMap<String, GroupInfo>,
    conversation_opts: HashMap<(String, String), RecvMsgOpt>,
    not_notify: HashMap<String, Vec<String>>,
    super_group_msgs: HashMap<(String, u32), MsgData>,
}

#[async_trait]
impl RelationCache for FakeCacheHub {
    async fn black_id_list(&self, user_id: &str) -> AppResult<Vec<String>> {
        Ok(self.black.get(user_id).cloned().unwrap_or_default())
    }

    async fn friend_id_list(&self, _user_id: &str) -> AppResult<Vec<String>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl GroupCache for FakeCacheHub {
    async fn member_ids(&self, _ctx: &RequestContext, group_id: &str) -> AppResult<Vec<String>> {
        self.members
            .get(group_id)
            .cloned()
            .ok_or_else(|| AppError::Cache("no member list".into()))
    }

    async fn member_info(
        &self,
        _ctx: &RequestContext,
        group_id: &str,
        user_id: &str,
    ) -> AppResult<GroupMemberInfo> {
        self.member_info
            .get(&(group_id.to_string(), user_id.to_string()))
            .cloned()
            .ok_or_else(|| AppError::Cache("no member info".into()))
    }

    async fn group_info(&self, _ctx: &RequestContext, group_id: &str) -> AppResult<GroupInfo> {
        self.groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| AppError::Cache("no group info".into()))
    }
}

#[async_trait]
impl ConversationCache for FakeCacheHub {
    async fn global_recv_opt(&self, _user_id: &str) -> AppResult<RecvMsgOpt> {
        Ok(RecvMsgOpt::Receive)
    }

    async fn conversation_recv_opt(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> AppResult<Option<RecvMsgOpt>> {
        Ok(self
            .conversation_opts
            .get(&(user_id.to_string(), conversation_id.to_string()))
            .copied())
    }

    async fn not_notify_user_ids(
        &self,
        _ctx: &RequestContext,
        group_id: &str,
    ) -> AppResult<Vec<String>> {
        Ok(self.not_notify.get(group_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl MsgReader for FakeCacheHub {
    async fn super_group_msg(
        &self,
        _ctx: &RequestContext,
        group_id: &str,
        seq: u32,
    ) -> AppResult<Option<MsgData>> {
        Ok(self
            .super_group_msgs
            .get(&(group_id.to_string(), seq))
            .cloned())
    }
}

struct NoopCallbacks;

#[async_trait]
impl CallbackBus for NoopCallbacks {
    async fn before_super_group_online_push(
        &self,
        _ctx: &RequestContext,
        _group_id: &str,
        _msg: &MsgData,
    ) -> AppResult<Option<Vec<String>>> {
        Ok(None)
    }

    async fn on_online_push(
        &self,
        _ctx: &RequestContext,
        _user_ids: &[String],
        _msg: &MsgData,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn before_offline_push(
        &self,
        _ctx: &RequestContext,
        _user_ids: &[String],
        _msg: &MsgData,
    ) -> AppResult<Option<Vec<String>>> {
        Ok(None)
    }
}

struct Harness {
    pusher: Pusher,
    online: Arc<ScriptedOnline>,
    offline: Arc<RecordingOffline>,
    storage: Arc<FakeStorage>,
}

fn harness(cache: FakeCacheHub, responses: Vec<Vec<SingleMsgToUserResultList>>) -> Harness {
    let cache = Arc::new(cache);
    let online = ScriptedOnline::with_responses(responses);
    let offline = Arc::new(RecordingOffline::default());
    let storage = Arc::new(FakeStorage::default());
    let pusher = Pusher::new(
        Arc::new(Config::test_defaults()),
        online.clone(),
        Some(offline.clone()),
        storage.clone(),
        cache.clone(),
        cache.clone(),
        cache.clone(),
        cache,
        Arc::new(NoopCallbacks),
    );
    Harness {
        pusher,
        online,
        offline,
        storage,
    }
}

fn ctx() -> RequestContext {
    RequestContext::for_operation("op-test")
}

fn single_text(send_id: &str, recv_id: &str) -> MsgData {
    let mut msg = MsgData {
        client_msg_id: "c1".into(),
        send_id: send_id.into(),
        recv_id: recv_id.into(),
        session_type: session::SINGLE_CHAT,
        content_type: ct::TEXT,
        content: b"hi".to_vec(),
        ..Default::default()
    };
    msg.options.insert(options::IS_OFFLINE_PUSH.into(), true);
    msg
}

fn super_group_text(send_id: &str, group_id: &str) -> MsgData {
    let mut msg = MsgData {
        client_msg_id: "c1".into(),
        send_id: send_id.into(),
        group_id: group_id.into(),
        session_type: session::SUPER_GROUP_CHAT,
        content_type: ct::TEXT,
        content: b"hi".to_vec(),
        ..Default::default()
    };
    msg.options.insert(options::IS_OFFLINE_PUSH.into(), true);
    msg
}

fn online_result(user_id: &str, online: bool) -> SingleMsgToUserResultList {
    SingleMsgToUserResultList {
        user_id: user_id.into(),
        resp: Vec::new(),
        online_push: online,
    }
}

fn super_group_cache(members: &[&str]) -> FakeCacheHub {
    let mut cache = FakeCacheHub::default();
    cache.groups.insert(
        "g1".into(),
        GroupInfo {
            group_id: "g1".into(),
            group_type: GROUP_TYPE_SUPER,
            status: 0,
        },
    );
    cache.members.insert(
        "g1".into(),
        members.iter().map(|m| m.to_string()).collect(),
    );
    cache
}

// Blocklisted sender: deny 600 before any gateway traffic.
#[tokio::test]
async fn test_single_blocklisted_never_reaches_gateway() {
    let mut cache = FakeCacheHub::default();
    cache.black.insert("u2".into(), vec!["u1".into()]);
    let h = harness(cache, vec![]);

    let err = h
        .pusher
        .msg_to_user(&ctx(), "u2", single_text("u1", "u2"))
        .await
        .unwrap_err();
    match err {
        AppError::Policy { code, reason } => {
            assert_eq!(code, 600);
            assert_eq!(reason, "in black list");
        }
        other => panic!("expected policy deny, got {other:?}"),
    }
    assert!(h.online.calls().is_empty());
    assert!(h.offline.calls().is_empty());
}

// Recipient online: offline provider stays untouched, options stamped.
#[tokio::test]
async fn test_single_online_skips_offline() {
    let h = harness(
        FakeCacheHub::default(),
        vec![vec![online_result("u2", true)]],
    );

    let mut msg = single_text("u1", "u2");
    msg.offline_push_info = Some(OfflinePushInfo {
        ios_badge_count: 3,
        ..Default::default()
    });
    h.pusher.msg_to_user(&ctx(), "u2", msg).await.unwrap();

    let calls = h.online.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].user_ids, vec!["u2".to_string()]);
    assert_eq!(
        calls[0].msg.options.get(options::IS_CONVERSATION_UPDATE),
        Some(&true)
    );
    assert!(!calls[0].msg.server_msg_id.is_empty());
    assert!(h.offline.calls().is_empty());
}

// Recipient offline with no provided title: derived title, body mirrors.
#[tokio::test]
async fn test_single_offline_derives_picture_title() {
    let h = harness(
        FakeCacheHub::default(),
        vec![vec![online_result("u2", false)]],
    );

    let mut msg = single_text("u1", "u2");
    msg.content_type = ct::PICTURE;
    h.pusher.msg_to_user(&ctx(), "u2", msg).await.unwrap();

    let calls = h.offline.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].user_ids, vec!["u2".to_string()]);
    assert_eq!(calls[0].title, "[Picture]");
    assert_eq!(calls[0].body, calls[0].title);
}

// The sender never offline-pushes themselves on the single path.
#[tokio::test]
async fn test_single_sender_echo_skips_offline() {
    let h = harness(
        FakeCacheHub::default(),
        vec![vec![online_result("u1", false)]],
    );

    h.pusher
        .msg_to_user(&ctx(), "u1", single_text("u1", "u1"))
        .await
        .unwrap();
    assert!(h.offline.calls().is_empty());
}

// IsOfflinePush=false is terminal regardless of online outcome.
#[tokio::test]
async fn test_offline_push_disabled_is_terminal() {
    let h = harness(
        FakeCacheHub::default(),
        vec![vec![online_result("u2", false)]],
    );

    let mut msg = single_text("u1", "u2");
    msg.options.insert(options::IS_OFFLINE_PUSH.into(), false);
    h.pusher.msg_to_user(&ctx(), "u2", msg).await.unwrap();
    assert!(h.offline.calls().is_empty());
}

// A revoke is normalized to IsOfflinePush=false even if the sender asked
// for offline push.
#[tokio::test]
async fn test_revoke_never_offline_pushes() {
    let h = harness(
        FakeCacheHub::default(),
        vec![vec![online_result("u2", false)]],
    );

    let mut msg = single_text("u1", "u2");
    msg.content_type = ct::REVOKE;
    h.pusher.msg_to_user(&ctx(), "u2", msg).await.unwrap();
    assert!(h.offline.calls().is_empty());
}

// Signaling notifications consult the invite gate exactly once before
// offline push.
#[tokio::test]
async fn test_single_signaling_invokes_invite_gate() {
    let h = harness(
        FakeCacheHub::default(),
        vec![vec![online_result("u2", false)]],
    );

    let mut msg = single_text("u1", "u2");
    msg.content_type = ct::SIGNALING_NOTIFICATION;
    msg.content = br#"{"kind":"invite","inviterId":"u1","inviteeIds":["u2"]}"#.to_vec();
    h.pusher.msg_to_user(&ctx(), "u2", msg).await.unwrap();

    assert_eq!(*h.storage.invite_calls.lock().unwrap(), 1);
    let calls = h.offline.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].opts.signal.as_ref().unwrap().client_msg_id,
        "c1".to_string()
    );
}

// Super group: u2 online, u3 offline, sender u1 excluded from offline.
#[tokio::test]
async fn test_super_group_offline_excludes_sender_and_online() {
    let h = harness(
        super_group_cache(&["u1", "u2", "u3"]),
        vec![vec![online_result("u2", true), online_result("u3", false)]],
    );

    h.pusher
        .msg_to_super_group_user(&ctx(), "g1", super_group_text("u1", "g1"))
        .await
        .unwrap();

    let calls = h.offline.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].user_ids, vec!["u3".to_string()]);
}

// Super group: a web client in background gets the offline push plus an
// online wake re-dispatch.
#[tokio::test]
async fn test_super_group_web_background_wake() {
    let background = SingleMsgToUserResultList {
        user_id: "u2".into(),
        resp: vec![SingleMsgToUserPlatform {
            recv_platform_id: platform::WEB,
            result_code: platform::RESULT_CODE_BACKGROUND,
        }],
        online_push: false,
    };
    let h = harness(super_group_cache(&["u1", "u2"]), vec![vec![background]]);

    h.pusher
        .msg_to_super_group_user(&ctx(), "g1", super_group_text("u1", "g1"))
        .await
        .unwrap();

    let offline_calls = h.offline.calls();
    assert_eq!(offline_calls.len(), 1);
    assert_eq!(offline_calls[0].user_ids, vec!["u2".to_string()]);

    let online_calls = h.online.calls();
    assert_eq!(online_calls.len(), 2, "expected fan-out plus wake retry");
    assert_eq!(online_calls[1].user_ids, vec!["u2".to_string()]);
}

// Super group do-not-notify users are pruned from the offline set.
#[tokio::test]
async fn test_super_group_do_not_notify_pruned() {
    let mut cache = super_group_cache(&["u1", "u2", "u3"]);
    cache.not_notify.insert("g1".into(), vec!["u3".into()]);
    let h = harness(
        cache,
        vec![vec![online_result("u2", false), online_result("u3", false)]],
    );

    h.pusher
        .msg_to_super_group_user(&ctx(), "g1", super_group_text("u1", "g1"))
        .await
        .unwrap();

    let calls = h.offline.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].user_ids, vec!["u2".to_string()]);
}

// Per-conversation ReceiveNotNotify silences one recipient's offline push
// without touching the other's option map.
#[tokio::test]
async fn test_super_group_silent_recipient_is_isolated() {
    let mut cache = super_group_cache(&["u1", "u2", "u3"]);
    cache.conversation_opts.insert(
        ("u2".to_string(), "super_group_g1".to_string()),
        RecvMsgOpt::ReceiveNotNotify,
    );
    let h = harness(
        cache,
        vec![
            vec![online_result("u2", false)],
            vec![online_result("u3", false)],
        ],
    );

    h.pusher
        .msg_to_super_group_user(&ctx(), "g1", super_group_text("u1", "g1"))
        .await
        .unwrap();

    // Distinct option maps force distinct gateway batches.
    let online_calls = h.online.calls();
    assert_eq!(online_calls.len(), 2);
    for call in &online_calls {
        if call.user_ids.contains(&"u2".to_string()) {
            assert_eq!(call.msg.options.get(options::IS_OFFLINE_PUSH), Some(&false));
        } else {
            assert_eq!(call.msg.options.get(options::IS_OFFLINE_PUSH), Some(&true));
        }
    }

    // u2 is silent: only u1 (sender) and u2 are excluded from offline.
    let offline_calls = h.offline.calls();
    assert_eq!(offline_calls.len(), 1);
    assert_eq!(offline_calls[0].user_ids, vec!["u3".to_string()]);
}

// Advanced revoke pointing at a different canonical message: deny 201,
// nothing dispatched.
#[tokio::test]
async fn test_super_group_revoke_mismatch_denied() {
    let mut cache = super_group_cache(&["u1", "u2"]);
    cache.super_group_msgs.insert(
        ("g1".to_string(), 7),
        MsgData {
            client_msg_id: "different".into(),
            seq: 7,
            ..Default::default()
        },
    );
    let h = harness(cache, vec![]);

    let mut msg = super_group_text("admin", "g1");
    msg.content_type = ct::ADVANCED_REVOKE;
    msg.content = serde_json::to_vec(&MessageRevoked {
        revoker_id: "admin".into(),
        source_message_send_id: "u9".into(),
        client_msg_id: "c7".into(),
        seq: 7,
        ..Default::default()
    })
    .unwrap();

    let err = h
        .pusher
        .msg_to_super_group_user(&ctx(), "g1", msg)
        .await
        .unwrap_err();
    match err {
        AppError::Policy { code, reason } => {
            assert_eq!(code, 201);
            assert_eq!(reason, "msg err");
        }
        other => panic!("expected policy deny, got {other:?}"),
    }
    assert!(h.online.calls().is_empty());
    assert!(h.offline.calls().is_empty());
}

// A cancelled request context propagates before any gateway traffic.
#[tokio::test]
async fn test_cancelled_context_propagates() {
    let h = harness(FakeCacheHub::default(), vec![]);
    let cancelled = ctx();
    cancelled.cancel();

    let err = h
        .pusher
        .msg_to_user(&cancelled, "u2", single_text("u1", "u2"))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(h.online.calls().is_empty());
    assert!(h.offline.calls().is_empty());
}

// An expired deadline ends the dispatch with a cancellation error; the
// offline path never runs.
#[tokio::test]
async fn test_expired_deadline_skips_dispatch() {
    let h = harness(super_group_cache(&["u1", "u2"]), vec![]);
    let expired = ctx().with_deadline(std::time::Duration::ZERO);

    let err = h
        .pusher
        .msg_to_super_group_user(&expired, "g1", super_group_text("u1", "g1"))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(h.online.calls().is_empty());
    assert!(h.offline.calls().is_empty());
}

// No provider configured: the offline leg fails distinguishably while a
// fully-online dispatch still succeeds.
#[tokio::test]
async fn test_unconfigured_provider_is_distinguishable() {
    let cache = Arc::new(super_group_cache(&["u1", "u2"]));
    let online = ScriptedOnline::with_responses(vec![vec![online_result("u2", false)]]);
    let pusher = Pusher::new(
        Arc::new(Config::test_defaults()),
        online.clone(),
        None,
        Arc::new(FakeStorage::default()),
        cache.clone(),
        cache.clone(),
        cache.clone(),
        cache,
        Arc::new(NoopCallbacks),
    );

    let err = pusher
        .msg_to_super_group_user(&ctx(), "g1", super_group_text("u1", "g1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OfflinePusherUnconfigured));
}
