//! 摄像头输入 - 设备枚举与平台相关的输入URL/格式
//!
//! 处理本地摄像头输入,支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)

use tracing::{info, warn};

/// 视频设备信息
#[derive(Debug, Clone)]
pub struct VideoDevice {
    pub name: String,
    pub index: usize,
}

/// 获取可用的视频设备列表
pub fn get_video_devices() -> Vec<VideoDevice> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => {
            info!("✅ 找到 {} 个视频设备", devices.len());
            devices
                .into_iter()
                .enumerate()
                .map(|(index, name)| VideoDevice { name, index })
                .collect()
        }
        Err(e) => {
            warn!("⚠️  获取设备列表失败: {}", e);
            Vec::new()
        }
    }
}

/// 格式化摄像头URL - 根据平台选择
#[allow(unused_variables)]
pub fn format_camera_url(index: usize, name: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("video={}", name)
    }
    #[cfg(target_os = "macos")]
    {
        format!("{}", index)
    }
    #[cfg(target_os = "linux")]
    {
        format!("/dev/video{}", index)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        format!("{}", index)
    }
}

/// 摄像头输入格式
pub fn input_format() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "dshow" // DirectShow
    }
    #[cfg(target_os = "macos")]
    {
        "avfoundation" // AVFoundation
    }
    #[cfg(target_os = "linux")]
    {
        "v4l2" // Video4Linux2
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        "video4linux2"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_camera_url() {
        assert_eq!(format_camera_url(1, "ignored"), "/dev/video1");
        assert_eq!(input_format(), "v4l2");
    }
}
