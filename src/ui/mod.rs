//! 交互层入口。
//!
//! 无界面运行：把下载事件渲染到终端（进度条或 JSON 行）。

pub mod console;
