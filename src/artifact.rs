//! 上传图片的临时文件
//!
//! 每个请求的上传内容先落盘，再交给人脸模型读取。[`Artifact`] 被创建时即绑定了删除动作：
//! 无论后续阶段成功还是失败，句柄离开作用域时文件都会被删除。

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use axum::body::Bytes;
use log::{debug, warn};
use uuid::Uuid;

use crate::error::{FaceError, Result};
use crate::metrics;

/// 一次请求上传的图片
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Bytes,
    /// 声明的 MIME 类型
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

impl UploadedImage {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self { bytes: bytes.into(), content_type: None, file_name: None }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// 临时文件的扩展名，优先使用 MIME 类型，其次是原始文件名
    fn extension(&self) -> String {
        let from_mime = self.content_type.as_deref().and_then(|mime| match mime {
            "image/jpeg" | "image/jpg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            "image/bmp" => Some("bmp"),
            "image/gif" => Some("gif"),
            "image/tiff" => Some("tiff"),
            _ => None,
        });
        if let Some(ext) = from_mime {
            return ext.to_string();
        }
        self.file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string())
    }
}

/// 存放临时文件的目录
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// 打开临时目录，不存在时创建
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(FaceError::StorageWrite)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 将上传内容写入一个新的临时文件
    pub async fn create(&self, image: &UploadedImage) -> Result<Artifact> {
        let id = Uuid::new_v4();
        let path = self.dir.join(format!("{}.{}", id, image.extension()));

        if let Err(e) = tokio::fs::write(&path, &image.bytes).await {
            // 写了一半的文件也要清理
            let _ = tokio::fs::remove_file(&path).await;
            return Err(FaceError::StorageWrite(e));
        }

        debug!("创建临时文件: {}", path.display());
        metrics::inc_live_artifacts();
        Ok(Artifact { id, path, released: AtomicBool::new(false) })
    }
}

/// 临时文件句柄，离开作用域时删除文件
#[derive(Debug)]
pub struct Artifact {
    id: Uuid,
    path: PathBuf,
    released: AtomicBool,
}

impl Artifact {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 删除临时文件
    ///
    /// 可以重复调用；文件已经不存在不算错误，其他错误只记录日志
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        metrics::dec_live_artifacts();
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("删除临时文件: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("删除临时文件失败 {}: {e}", self.path.display()),
        }
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        self.release();
    }
}
