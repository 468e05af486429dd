//! 主体内存存储实现
//!
//! `with_default_admin` 内置 admin 账户（用户名 admin，口令 admin123，明文形式），
//! 首次登录时由认证服务升级为 argon2 哈希。

use crate::error::StorageError;
use crate::models::SubjectRecord;
use crate::traits::SubjectStore;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemorySubjectStore {
    subjects: RwLock<HashMap<String, SubjectRecord>>,
    refresh_jtis: RwLock<HashMap<String, String>>,
}

impl InMemorySubjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_admin() -> Self {
        let store = Self::new();
        if let Ok(mut subjects) = store.subjects.write() {
            subjects.insert(
                "admin".to_string(),
                SubjectRecord {
                    subject_id: "admin".to_string(),
                    facility_id: String::new(),
                    username: "admin".to_string(),
                    display_name: "Administrator".to_string(),
                    password_hash: "admin123".to_string(),
                    roles: vec![domain::Role::Admin.as_str().to_string()],
                    pin_hash: None,
                    biometric_credential_id: None,
                    biometric_secret: None,
                    membership_end_ms: None,
                    membership_status: None,
                },
            );
        }
        store
    }
}

#[async_trait::async_trait]
impl SubjectStore for InMemorySubjectStore {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<SubjectRecord>, StorageError> {
        let subjects = self
            .subjects
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(subjects
            .values()
            .find(|item| item.username == username)
            .cloned())
    }

    async fn find_subject(&self, subject_id: &str) -> Result<Option<SubjectRecord>, StorageError> {
        let subjects = self
            .subjects
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(subjects.get(subject_id).cloned())
    }

    async fn upsert_subject(&self, record: SubjectRecord) -> Result<SubjectRecord, StorageError> {
        let mut subjects = self
            .subjects
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        subjects.insert(record.subject_id.clone(), record.clone());
        Ok(record)
    }

    async fn update_password_hash(
        &self,
        subject_id: &str,
        password_hash: &str,
    ) -> Result<bool, StorageError> {
        let mut subjects = self
            .subjects
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match subjects.get_mut(subject_id) {
            Some(record) => {
                record.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_refresh_jti(&self, subject_id: &str) -> Result<Option<String>, StorageError> {
        let jtis = self
            .refresh_jtis
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(jtis.get(subject_id).cloned())
    }

    async fn set_refresh_jti(
        &self,
        subject_id: &str,
        refresh_jti: Option<&str>,
    ) -> Result<bool, StorageError> {
        let exists = self
            .subjects
            .read()
            .map_err(|_| StorageError::new("lock failed"))?
            .contains_key(subject_id);
        if !exists {
            return Ok(false);
        }
        let mut jtis = self
            .refresh_jtis
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match refresh_jti {
            Some(jti) => {
                jtis.insert(subject_id.to_string(), jti.to_string());
            }
            None => {
                jtis.remove(subject_id);
            }
        }
        Ok(true)
    }
}
