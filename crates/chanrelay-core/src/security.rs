use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    domain::{ChatId, UserId},
    store, Result,
};

// ============== Authorization ==============

/// Administrative commands are honoured only inside the control group and only
/// from listed admins.
pub fn is_authorized(
    user_id: Option<UserId>,
    chat_id: ChatId,
    control_group: ChatId,
    admins: &AdminList,
) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    chat_id == control_group && admins.is_admin(user_id)
}

// ============== Admin List ==============

#[derive(Debug, Default, Serialize, Deserialize)]
struct AdminFile {
    #[serde(default)]
    admins: Vec<i64>,
}

/// Admin user ids, persisted as `{"admins":[..]}`. The main admin is always
/// included even if the file omits it.
#[derive(Clone, Debug)]
pub struct AdminList {
    admins: BTreeSet<i64>,
}

impl AdminList {
    pub fn new(admins: impl IntoIterator<Item = i64>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    pub fn load(path: impl Into<PathBuf>, main_admin: i64) -> Result<Self> {
        let path = path.into();
        let file: AdminFile = store::load_or_init(&path, || AdminFile {
            admins: vec![main_admin],
        })?;
        let mut list = Self::new(file.admins);
        list.admins.insert(main_admin);
        Ok(list)
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admins.contains(&user_id.0)
    }

    pub fn len(&self) -> usize {
        self.admins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}

/// The admin file, re-read before each command so hand edits apply without a
/// restart. A file that fails to parse keeps the last good list.
pub struct AdminStore {
    path: PathBuf,
    main_admin: i64,
    current: RwLock<Arc<AdminList>>,
}

impl AdminStore {
    pub fn load(path: impl Into<PathBuf>, main_admin: i64) -> Result<Self> {
        let path = path.into();
        let list = AdminList::load(&path, main_admin)?;
        info!(path = %path.display(), admins = list.len(), "loaded admin list");
        Ok(Self {
            path,
            main_admin,
            current: RwLock::new(Arc::new(list)),
        })
    }

    pub fn current(&self) -> Arc<AdminList> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn refresh(&self) -> Arc<AdminList> {
        match AdminList::load(&self.path, self.main_admin) {
            Ok(list) => {
                let list = Arc::new(list);
                *self.current.write().unwrap_or_else(|e| e.into_inner()) = list.clone();
                list
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "admin list reload failed, keeping previous list");
                self.current()
            }
        }
    }
}
