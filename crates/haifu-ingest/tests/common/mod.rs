//! Shared fixtures for the integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use flate2::write::GzEncoder;
use flate2::Compression;
use haifu_ingest::config::IngestConfig;
use haifu_ingest::layout::Layout;
use haifu_ingest::remote::RemoteSite;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use wiremock::MockServer;

pub const RAW_OK: &str = r#"<mjloggm ver="2.3"><SHUFFLE seed="mt19937ar-sha512-n288-base64,..." ref=""/><GO type="169" lobby="0"/></mjloggm>"#;
pub const CONVERTED_OK: &str = r#"{"ver":2.3,"ref":"","log":[[[0,0,0],[25000,25000,25000,25000]]]}"#;

/// Identifier in the shape the default pattern expects
pub fn game_id(n: u32) -> String {
    format!("2024010100gm-00a9-0000-{:08x}", n)
}

/// One archive line of the given category linking to `id`
pub fn archive_line(category: &str, id: &str) -> String {
    format!(
        r#"00:05 | 20 | {}－ | <a href="http://tenhou.net/0/?log={}">牌譜</a> | A(+50.0) B(+10.0) C(-20.0) D(-40.0)<br>"#,
        category, id
    )
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Configuration pointing every endpoint at the mock server
pub fn config_for(server: &MockServer) -> IngestConfig {
    let uri = server.uri();
    let mut config = IngestConfig::default();
    config.remote.listing_url = format!("{}/list.cgi", uri);
    config.remote.archive_base_url = format!("{}/dat", uri);
    config.remote.record_url_template = format!("{}/log/{{id}}", uri);
    config.remote.convert_url_template = format!("{}/convert/{{id}}", uri);
    config.remote.listing_max_retries = 1;
    config.remote.request_timeout_secs = 10;
    config.validate().unwrap();
    config
}

/// Same endpoints as [`config_for`], as a TOML file in `root`
pub fn write_config_file(root: &Path, server: &MockServer) {
    let text = format!(
        r#"
[remote]
listing_url = "{uri}/list.cgi"
archive_base_url = "{uri}/dat"
record_url_template = "{uri}/log/{{id}}"
convert_url_template = "{uri}/convert/{{id}}"
listing_max_retries = 1
"#,
        uri = server.uri()
    );
    std::fs::write(root.join("haifu.toml"), text).unwrap();
}

pub struct Harness {
    pub root: TempDir,
    pub config: IngestConfig,
    pub layout: Layout,
    pub remote: RemoteSite,
}

impl Harness {
    pub fn new(server: &MockServer) -> Self {
        let root = TempDir::new().unwrap();
        let config = config_for(server);
        let layout = Layout::new(root.path(), &config.layout);
        let remote = RemoteSite::new(&config.remote).unwrap();
        Self {
            root,
            config,
            layout,
            remote,
        }
    }

    pub fn write(&self, relative: &str, contents: impl AsRef<[u8]>) {
        let path = self.root.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root.path().join(relative).exists()
    }

    pub fn len(&self, relative: &str) -> u64 {
        std::fs::metadata(self.root.path().join(relative)).unwrap().len()
    }

    pub fn files_in(&self, dir: &str) -> Vec<String> {
        let path = self.root.path().join(dir);
        if !path.is_dir() {
            return Vec::new();
        }
        let mut names: Vec<String> = std::fs::read_dir(path)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
