//! 视频批量下载器：驱动外部 yt-dlp 逐个下载一批视频链接。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/外部工具定位/子进程/临时文件清理等基础设施
//! - `download`：输入解析、参数生成、进度聚合与批次执行
//! - `ui`：终端事件渲染

pub mod base_system;
pub mod download;
pub mod ui;
