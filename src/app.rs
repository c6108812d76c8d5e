use crate::adapters::{
    FileStore, HttpBackend, RandomPushRegistrar, SystemTimeProvider, TerminalPresenter,
};
use crate::config::AppConfig;
use crate::error::{AppError, ConfigError};
use crate::mutes::{MuteRefresh, MuteStateStore};
use crate::notifications::NotificationCoordinator;
use crate::poller::SensorPoller;
use crate::ports::{
    AlertPresenter, MuteService, NotificationLog, PushRegistrar, SensorService, SessionService,
    SharedStore, TimeProvider,
};
use crate::scheduler::{Scheduler, SweepOutcome};
use crate::session::SessionManager;
use crate::types::{Credentials, Session};

use std::sync::Arc;

pub trait Backend: SessionService + SensorService + MuteService + NotificationLog {}

impl<B> Backend for B where B: SessionService + SensorService + MuteService + NotificationLog {}

pub type ColdwatchApp = App<SystemTimeProvider, HttpBackend, TerminalPresenter, RandomPushRegistrar>;

#[derive(Debug, Clone, PartialEq)]
pub struct ColdStart {
    pub session: Session,
    pub mutes: MuteRefresh,
    pub sweep: Option<SweepOutcome>,
}

pub struct App<T, B, P, R> {
    session: SessionManager<T, B, R>,
    poller: Arc<SensorPoller<T, B>>,
    mutes: Arc<MuteStateStore<B>>,
    notifications: Arc<NotificationCoordinator<T, B, P>>,
    scheduler: Scheduler<T, B, B, B, P>,
    page_size: u32,
}

impl ColdwatchApp {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let timeout = std::time::Duration::try_from(config.request_timeout)
            .map_err(|err| ConfigError::Invalid(format!("request timeout: {err}")))?;
        let backend = HttpBackend::new(&config.base_url, timeout).map_err(AppError::Backend)?;
        let store: SharedStore = Arc::new(FileStore::open(&config.data_dir)?);
        Ok(App::new(
            SystemTimeProvider,
            backend,
            TerminalPresenter,
            RandomPushRegistrar,
            store,
            config,
        ))
    }
}

impl<T, B, P, R> App<T, B, P, R>
where
    T: TimeProvider,
    B: Backend,
    P: AlertPresenter,
    R: PushRegistrar,
{
    pub fn new(
        time: T,
        backend: B,
        presenter: P,
        registrar: R,
        store: SharedStore,
        config: &AppConfig,
    ) -> Self {
        let poller = Arc::new(
            SensorPoller::new(time.clone(), backend.clone(), Arc::clone(&store))
                .with_offline_after(config.offline_after),
        );
        let mutes = Arc::new(MuteStateStore::new(backend.clone(), Arc::clone(&store)));
        let notifications = Arc::new(NotificationCoordinator::new(
            time.clone(),
            backend.clone(),
            presenter,
            Arc::clone(&store),
        ));
        let session = SessionManager::new(time, backend, registrar, store)
            .with_scoped_state(poller.clone())
            .with_scoped_state(mutes.clone())
            .with_scoped_state(notifications.clone());
        let scheduler = Scheduler::new(
            Arc::clone(&poller),
            Arc::clone(&mutes),
            Arc::clone(&notifications),
        );

        Self {
            session,
            poller,
            mutes,
            notifications,
            scheduler,
            page_size: config.page_size,
        }
    }

    pub fn session(&self) -> &SessionManager<T, B, R> {
        &self.session
    }

    pub fn poller(&self) -> &SensorPoller<T, B> {
        &self.poller
    }

    pub fn mutes(&self) -> &MuteStateStore<B> {
        &self.mutes
    }

    pub fn notifications(&self) -> &NotificationCoordinator<T, B, P> {
        &self.notifications
    }

    pub fn scheduler(&self) -> &Scheduler<T, B, B, B, P> {
        &self.scheduler
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AppError> {
        let session = self.session.login(credentials).await?;
        if let Err(err) = self.refresh_mutes(&session).await {
            tracing::warn!(user_id = %session.user_id, error = %err, "mute refresh after login failed");
        }
        Ok(session)
    }

    pub async fn start(&self) -> Result<Option<ColdStart>, AppError> {
        let Some(session) = self.session.restore_session()? else {
            return Ok(None);
        };
        let mutes = self.refresh_mutes(&session).await?;
        let sweep = self.scheduler.on_cold_start(&session).await?;
        Ok(Some(ColdStart {
            session,
            mutes,
            sweep,
        }))
    }

    pub async fn refresh(&self) -> Result<SweepOutcome, AppError> {
        let session = self.require_session()?;
        Ok(self.scheduler.on_manual_refresh(&session).await?)
    }

    pub fn require_session(&self) -> Result<Session, AppError> {
        if let Some(session) = self.session.current() {
            return Ok(session);
        }
        self.session
            .restore_session()?
            .ok_or(AppError::NotAuthenticated)
    }

    async fn refresh_mutes(&self, session: &Session) -> Result<MuteRefresh, AppError> {
        let sensors = self.poller.refresh_sensors(&session.user_id).await?;
        let summary = self.mutes.refresh(&session.user_id, &sensors).await?;
        if !summary.failed.is_empty() {
            tracing::warn!(
                user_id = %session.user_id,
                failed = ?summary.failed,
                "some mute flags kept their cached value"
            );
        }
        Ok(summary)
    }
}
