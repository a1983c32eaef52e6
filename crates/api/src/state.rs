use std::sync::Arc;
use std::time::Duration;

use mongodb::Database;
use parley_config::{PushSettings, Settings};
use parley_services::{
    AuthService, LogPushProvider, MessageDispatcher, Notifier, PresenceRegistry, PushProvider,
    ReceiptAggregator, TaskService,
    dao::{CommentDao, ContainerDao, MessageDao, UserDao},
    notification::FcmPushProvider,
};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settings: Settings,
    pub auth: Arc<AuthService>,
    pub users: Arc<UserDao>,
    pub containers: Arc<ContainerDao>,
    pub messages: Arc<MessageDao>,
    pub comments: Arc<CommentDao>,
    pub presence: Arc<PresenceRegistry>,
    pub tasks: TaskService,
    pub dispatcher: MessageDispatcher,
    pub receipts: Arc<ReceiptAggregator>,
}

impl AppState {
    pub fn new(db: Database, settings: Settings) -> Self {
        let provider = push_provider(&settings.push);
        Self::with_push_provider(db, settings, provider)
    }

    pub fn with_push_provider(
        db: Database,
        settings: Settings,
        provider: Arc<dyn PushProvider>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(settings.jwt.clone()));
        let users = Arc::new(UserDao::new(&db));
        let containers = Arc::new(ContainerDao::new(&db));
        let messages = Arc::new(MessageDao::new(&db));
        let comments = Arc::new(CommentDao::new(&db));
        let presence = Arc::new(PresenceRegistry::new());
        let tasks = TaskService::new();

        let notifier = Arc::new(Notifier::new(
            provider,
            Arc::clone(&users),
            settings.dispatch.preview_length,
            Duration::from_millis(settings.push.request_timeout_ms),
        ));
        info!(provider = notifier.provider_name(), "Push provider ready");

        let dispatcher = MessageDispatcher::new(
            db.clone(),
            Arc::clone(&users),
            Arc::clone(&containers),
            Arc::clone(&messages),
            Arc::clone(&comments),
            Arc::clone(&presence),
            notifier,
            tasks.clone(),
            &settings.dispatch,
        );
        let receipts = Arc::new(ReceiptAggregator::new(
            Arc::clone(&containers),
            Arc::clone(&messages),
            Arc::clone(&presence),
            tasks.clone(),
        ));

        Self {
            db,
            settings,
            auth,
            users,
            containers,
            messages,
            comments,
            presence,
            tasks,
            dispatcher,
            receipts,
        }
    }
}

fn push_provider(settings: &PushSettings) -> Arc<dyn PushProvider> {
    match (settings.provider.as_str(), &settings.fcm_server_key) {
        ("fcm", Some(key)) => Arc::new(FcmPushProvider::new(
            settings.fcm_endpoint.clone(),
            key.clone(),
        )),
        ("fcm", None) => {
            warn!("push.provider is fcm but no server key is set, logging pushes instead");
            Arc::new(LogPushProvider)
        }
        _ => Arc::new(LogPushProvider),
    }
}
