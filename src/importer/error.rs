// ==========================================
// 插单排产系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::error::TimelineError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("JSON 解析失败: {0}")]
    JsonParseError(String),

    // ===== 引用解析错误 =====
    #[error("名称重复 ({entity}): {name}")]
    DuplicateName { entity: String, name: String },

    #[error("作业 {job} 引用了未知资源: {resource}")]
    UnknownResource { job: String, resource: String },

    #[error("资源 {resource} 上的块引用了未知作业: {job}")]
    UnknownJob { resource: String, job: String },

    #[error("路线无效 (作业 {job}): {message}")]
    InvalidRouting { job: String, message: String },

    // ===== 时间轴错误 =====
    #[error("时间轴数据无效 (资源 {resource}): {source}")]
    Timeline {
        resource: String,
        #[source]
        source: TimelineError,
    },

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::JsonParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
