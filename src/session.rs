use crate::error::{RemoteError, SessionError, StoreError};
use crate::ports::store::{read_json, write_json};
use crate::ports::{PushRegistrar, SessionService, SharedStore, TimeProvider};
use crate::types::{Credentials, Session};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

pub(crate) const SESSION_KEY: &str = "session";
pub(crate) const ROLE_KEY: &str = "session.role";
pub(crate) const PUSH_TOKEN_KEY: &str = "push_token";

pub trait SessionScoped: Send + Sync {
    fn clear_session_state(&self, user_id: &str) -> Result<(), StoreError>;
}

pub struct SessionManager<T, R, P> {
    time: T,
    remote: R,
    registrar: P,
    store: SharedStore,
    current: RwLock<Option<Session>>,
    login_in_flight: AtomicBool,
    scoped: Vec<Arc<dyn SessionScoped>>,
}

impl<T, R, P> SessionManager<T, R, P>
where
    T: TimeProvider,
    R: SessionService,
    P: PushRegistrar,
{
    pub fn new(time: T, remote: R, registrar: P, store: SharedStore) -> Self {
        Self {
            time,
            remote,
            registrar,
            store,
            current: RwLock::new(None),
            login_in_flight: AtomicBool::new(false),
            scoped: Vec::new(),
        }
    }

    pub fn with_scoped_state(mut self, state: Arc<dyn SessionScoped>) -> Self {
        self.scoped.push(state);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().expect("session lock").is_some()
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().expect("session lock").clone()
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        let _in_flight =
            InFlight::acquire(&self.login_in_flight).ok_or(SessionError::OperationInProgress)?;
        if self.is_authenticated() {
            return Err(SessionError::AlreadyAuthenticated);
        }

        let email = credentials.email.trim();
        if email.is_empty() || credentials.password.is_empty() {
            return Err(SessionError::InvalidCredentials);
        }

        let payload = self
            .remote
            .authenticate(email, &credentials.password)
            .await
            .map_err(classify_login_error)?;

        let session = Session {
            token: payload.token,
            user_id: payload.user_id,
            role: payload.role,
            issued_at: self.time.now(),
        };

        if let Err(err) = self.persist(&session).await {
            self.discard_persisted();
            return Err(err.into());
        }

        *self.current.write().expect("session lock") = Some(session.clone());
        tracing::info!(
            user_id = %session.user_id,
            role = session.role.as_str(),
            "session established"
        );
        Ok(session)
    }

    /// Reads the persisted session on cold start. Never touches the network.
    pub fn restore_session(&self) -> Result<Option<Session>, SessionError> {
        let session: Option<Session> = read_json(self.store.as_ref(), SESSION_KEY)?;
        if let Some(session) = session.as_ref()
            && self.store.get(ROLE_KEY)?.as_deref() != Some(session.role.as_str())
        {
            self.store.set(ROLE_KEY, session.role.as_str())?;
        }
        *self.current.write().expect("session lock") = session.clone();
        if let Some(session) = session.as_ref() {
            tracing::debug!(user_id = %session.user_id, "session restored");
        }
        Ok(session)
    }

    /// `LogoutFailed` still signs the user out locally.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let session = match self.current() {
            Some(session) => Some(session),
            None => read_json::<Session>(self.store.as_ref(), SESSION_KEY).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to read persisted session during logout");
                None
            }),
        };

        let remote_result = match session.as_ref() {
            Some(session) => self.invalidate_push_token(&session.user_id).await,
            None => Ok(()),
        };

        let user_id = session.as_ref().map(|session| session.user_id.as_str());
        let cleared = self.clear_local(user_id.unwrap_or_default());
        *self.current.write().expect("session lock") = None;

        cleared?;
        if let Err(err) = remote_result {
            tracing::warn!(
                user_id = user_id.unwrap_or_default(),
                error = %err,
                "logout completed locally only"
            );
            return Err(SessionError::LogoutFailed(err));
        }
        tracing::info!(user_id = user_id.unwrap_or_default(), "logged out");
        Ok(())
    }

    pub fn invalidate(&self) -> Result<(), SessionError> {
        let user_id = self.current().map(|session| session.user_id);
        let cleared = self.clear_local(user_id.as_deref().unwrap_or_default());
        *self.current.write().expect("session lock") = None;
        tracing::info!(user_id = user_id.as_deref().unwrap_or_default(), "session invalidated");
        cleared.map_err(SessionError::from)
    }

    async fn persist(&self, session: &Session) -> Result<(), StoreError> {
        write_json(self.store.as_ref(), SESSION_KEY, session)?;
        self.store.set(ROLE_KEY, session.role.as_str())?;

        let Some(push_token) = self.registrar.device_token() else {
            tracing::warn!("push notifications unavailable: no device token");
            return Ok(());
        };
        self.store.set(PUSH_TOKEN_KEY, &push_token)?;
        if let Err(err) = self
            .remote
            .register_push_token(&session.user_id, &push_token)
            .await
        {
            tracing::warn!(
                user_id = %session.user_id,
                error = %err,
                "failed to register push token"
            );
        }
        Ok(())
    }

    fn discard_persisted(&self) {
        for key in [SESSION_KEY, ROLE_KEY, PUSH_TOKEN_KEY] {
            if let Err(err) = self.store.delete(key) {
                tracing::warn!(key, error = %err, "failed to roll back partial login");
            }
        }
    }

    async fn invalidate_push_token(&self, user_id: &str) -> Result<(), RemoteError> {
        let push_token = self.store.get(PUSH_TOKEN_KEY).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to read push token during logout");
            None
        });
        match push_token {
            Some(push_token) => self.remote.invalidate_token(user_id, &push_token).await,
            None => {
                tracing::debug!(user_id, "no push token to invalidate");
                Ok(())
            }
        }
    }

    fn clear_local(&self, user_id: &str) -> Result<(), StoreError> {
        let mut first_error = None;
        for key in [SESSION_KEY, ROLE_KEY, PUSH_TOKEN_KEY] {
            if let Err(err) = self.store.delete(key) {
                tracing::error!(key, error = %err, "failed to clear session key");
                first_error.get_or_insert(err);
            }
        }
        for state in &self.scoped {
            if let Err(err) = state.clear_session_state(user_id) {
                tracing::error!(error = %err, "failed to clear session-scoped state");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn classify_login_error(err: RemoteError) -> SessionError {
    match err {
        RemoteError::Unauthorized => SessionError::InvalidCredentials,
        RemoteError::Rejected { status, .. } if (400..500).contains(&status) => {
            SessionError::InvalidCredentials
        }
        other => SessionError::Network(other),
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
