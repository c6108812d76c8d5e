use crate::error::{NotificationError, StoreError};
use crate::ports::store::{read_json, write_json};
use crate::ports::{AlertPresenter, NotificationLog, SharedStore, TimeProvider};
use crate::session::SessionScoped;
use crate::types::{AlertEvent, NotificationRecord};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

pub const DEFAULT_PAGE_SIZE: u32 = 15;

pub(crate) fn log_key(user_id: &str) -> String {
    format!("notifications.{user_id}")
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalLog {
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPage {
    pub records: Vec<NotificationRecord>,
    pub end_of_data: bool,
}

pub struct NotificationCoordinator<T, L, P> {
    time: T,
    remote: L,
    presenter: P,
    store: SharedStore,
    unread: Mutex<HashMap<String, u64>>,
    log_lock: Mutex<()>,
}

impl<T, L, P> NotificationCoordinator<T, L, P>
where
    T: TimeProvider,
    L: NotificationLog,
    P: AlertPresenter,
{
    pub fn new(time: T, remote: L, presenter: P, store: SharedStore) -> Self {
        Self {
            time,
            remote,
            presenter,
            store,
            unread: Mutex::new(HashMap::new()),
            log_lock: Mutex::new(()),
        }
    }

    pub async fn record(&self, user_id: &str, alert: &AlertEvent) -> Result<(), NotificationError> {
        let message = alert.message();
        self.append(user_id, NotificationRecord {
            message: message.clone(),
            sensor_name: Some(alert.sensor.clone()),
            created_at: self.time.now(),
        })?;
        self.presenter.present(AlertEvent::TITLE, &message);
        self.bump_unread(user_id);

        if let Err(err) = self
            .remote
            .publish(user_id, Some(&alert.sensor), &message)
            .await
        {
            tracing::warn!(user_id, sensor = %alert.sensor, error = %err, "failed to forward alert");
        }
        Ok(())
    }

    /// Only a foregrounded delivery counts as unread.
    pub fn receive_push(
        &self,
        user_id: &str,
        message: &str,
        foreground: bool,
    ) -> Result<(), NotificationError> {
        self.append(user_id, NotificationRecord {
            message: message.to_string(),
            sensor_name: None,
            created_at: self.time.now(),
        })?;
        if foreground {
            self.bump_unread(user_id);
        }
        Ok(())
    }

    pub async fn list(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<NotificationPage, NotificationError> {
        if page == 0 || page_size == 0 {
            return Err(NotificationError::InvalidPage { page, page_size });
        }

        let mut records = self
            .remote
            .fetch_page(user_id, page, page_size)
            .await
            .map_err(NotificationError::Network)?;
        let end_of_data = records.len() < page_size as usize;
        records.truncate(page_size as usize);
        Ok(NotificationPage {
            records,
            end_of_data,
        })
    }

    pub fn local_log(&self, user_id: &str) -> Result<Vec<NotificationRecord>, NotificationError> {
        let log = read_json::<LocalLog>(self.store.as_ref(), &log_key(user_id))?;
        Ok(log.map(|log| log.records).unwrap_or_default())
    }

    pub fn mark_all_seen(&self, user_id: &str) {
        self.unread
            .lock()
            .expect("unread lock")
            .remove(user_id);
    }

    pub fn unread_count(&self, user_id: &str) -> u64 {
        self.unread
            .lock()
            .expect("unread lock")
            .get(user_id)
            .copied()
            .unwrap_or(0)
    }

    fn append(&self, user_id: &str, record: NotificationRecord) -> Result<(), StoreError> {
        let key = log_key(user_id);
        let _guard = self.log_lock.lock().expect("notification log lock");
        let mut log = read_json::<LocalLog>(self.store.as_ref(), &key)?.unwrap_or_default();
        log.records.push(record);
        write_json(self.store.as_ref(), &key, &log)
    }

    fn bump_unread(&self, user_id: &str) {
        *self
            .unread
            .lock()
            .expect("unread lock")
            .entry(user_id.to_string())
            .or_insert(0) += 1;
    }
}

impl<T, L, P> SessionScoped for NotificationCoordinator<T, L, P>
where
    T: TimeProvider,
    L: NotificationLog,
    P: AlertPresenter,
{
    fn clear_session_state(&self, user_id: &str) -> Result<(), StoreError> {
        self.mark_all_seen(user_id);
        let _guard = self.log_lock.lock().expect("notification log lock");
        self.store.delete(&log_key(user_id))
    }
}

#[derive(Debug, Clone)]
pub struct NotificationPager {
    user_id: String,
    page_size: u32,
    next_page: u32,
    end_of_data: bool,
}

impl NotificationPager {
    pub fn new(user_id: impl Into<String>, page_size: u32) -> Self {
        Self {
            user_id: user_id.into(),
            page_size,
            next_page: 1,
            end_of_data: false,
        }
    }

    pub fn end_of_data(&self) -> bool {
        self.end_of_data
    }

    pub async fn next<T, L, P>(
        &mut self,
        coordinator: &NotificationCoordinator<T, L, P>,
    ) -> Result<Option<Vec<NotificationRecord>>, NotificationError>
    where
        T: TimeProvider,
        L: NotificationLog,
        P: AlertPresenter,
    {
        if self.end_of_data {
            return Ok(None);
        }
        let page = coordinator
            .list(&self.user_id, self.next_page, self.page_size)
            .await?;
        self.next_page += 1;
        self.end_of_data = page.end_of_data;
        Ok(Some(page.records))
    }

    pub async fn collect_all<T, L, P>(
        &mut self,
        coordinator: &NotificationCoordinator<T, L, P>,
    ) -> Result<Vec<NotificationRecord>, NotificationError>
    where
        T: TimeProvider,
        L: NotificationLog,
        P: AlertPresenter,
    {
        let mut all = Vec::new();
        while let Some(records) = self.next(coordinator).await? {
            all.extend(records);
        }
        Ok(all)
    }
}
