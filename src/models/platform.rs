//! Client platform identifiers as reported by the gateway fleet.

pub const IOS: i32 = 1;
pub const ANDROID: i32 = 2;
pub const WINDOWS: i32 = 3;
pub const OSX: i32 = 4;
pub const WEB: i32 = 5;
pub const MINI_WEB: i32 = 6;
pub const LINUX: i32 = 7;
pub const ANDROID_PAD: i32 = 8;
pub const IPAD: i32 = 9;

/// Gateway result code meaning the connection exists but the client UI is
/// suspended (hidden browser tab, minimized desktop window).
pub const RESULT_CODE_BACKGROUND: i64 = -2;

/// Platforms that keep a suspended connection worth waking: the browser
/// plus the desktop terminals.
pub fn is_web_or_pc_terminal(platform_id: i32) -> bool {
    matches!(platform_id, WEB | WINDOWS | OSX | LINUX)
}

pub fn name(platform_id: i32) -> &'static str {
    match platform_id {
        IOS => "iOS",
        ANDROID => "Android",
        WINDOWS => "Windows",
        OSX => "OSX",
        WEB => "Web",
        MINI_WEB => "MiniWeb",
        LINUX => "Linux",
        ANDROID_PAD => "AndroidPad",
        IPAD => "iPad",
        _ => "Unknown",
    }
}
