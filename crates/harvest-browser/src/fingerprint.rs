use rand::seq::SliceRandom;

/// User agent shared by the browser and the list endpoint client, so the
/// site sees one client behind both.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/75.0.3770.100 Safari/537.36";

pub const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9";

const VIEWPORTS: [(u32, u32); 4] = [(1920, 1080), (1366, 768), (1536, 864), (1440, 900)];

/// Browser identity presented to the site.
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub accept_language: String,
}

impl FingerprintConfig {
    /// Fixed user agent, window size picked at random per launch.
    pub fn randomized() -> Self {
        let (width, height) = *VIEWPORTS
            .choose(&mut rand::thread_rng())
            .unwrap_or(&VIEWPORTS[0]);

        Self {
            user_agent: USER_AGENT.to_string(),
            viewport_width: width,
            viewport_height: height,
            accept_language: ACCEPT_LANGUAGE.to_string(),
        }
    }

    pub fn chrome_args(&self) -> Vec<String> {
        vec![
            format!("--user-agent={}", self.user_agent),
            "--lang=zh-CN".to_string(),
        ]
    }
}
