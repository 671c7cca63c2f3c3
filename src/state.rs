use std::sync::Arc;

use sqlx::MySqlPool;

use crate::attendance::storage::CloudinaryStore;
use crate::attendance::store::MySqlRecordStore;
use crate::attendance::{CheckInService, RetentionSweeper};
use crate::config::Config;

pub type CheckIn = CheckInService<MySqlRecordStore, CloudinaryStore>;
pub type Sweeper = RetentionSweeper<MySqlRecordStore, CloudinaryStore>;

/// Services shared by every worker.
pub struct AppState {
    pub check_in: CheckIn,
    pub sweeper: Arc<Sweeper>,
}

impl AppState {
    pub fn new(pool: MySqlPool, config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(MySqlRecordStore::new(pool));
        let objects = Arc::new(CloudinaryStore::new(
            config.cloudinary.clone(),
            config.attendance.storage_timeout,
        )?);

        Ok(Self {
            check_in: CheckInService::new(
                store.clone(),
                objects.clone(),
                config.attendance.clone(),
            ),
            sweeper: Arc::new(RetentionSweeper::new(store, objects, &config.attendance)),
        })
    }
}
