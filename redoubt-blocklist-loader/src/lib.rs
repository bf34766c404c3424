use sha2::{Digest, Sha256};
use std::collections::HashSet;

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum BlocklistKind {
    EtcHosts,
}

impl BlocklistKind {
    fn parse(self, input: &str) -> HashSet<String> {
        match self {
            Self::EtcHosts => parse_hostfile(input),
        }
    }
}

fn parse_hostfile(input: &str) -> HashSet<String> {
    input
        .split('\n')
        .flat_map(|line| {
            line.split_whitespace()
                .take_while(|item| !item.starts_with('#'))
                .enumerate()
                .filter_map(|(idx, item)| if idx > 0 { Some(item) } else { None })
                .map(|item| item.to_string())
        })
        .collect()
}

fn hash(input: &str) -> String {
    let result = Sha256::new().chain_update(input).finalize();
    base16ct::lower::encode_string(&result)
}

#[derive(Debug)]
pub struct Blocklist {
    pub hash: String,
    pub entries: HashSet<String>,
}

impl Blocklist {
    pub fn from_file(value: &str, kind: BlocklistKind) -> Self {
        let hash = hash(value);
        let entries = kind.parse(value);

        Self { hash, entries }
    }
}

#[derive(Debug, Default)]
pub struct BlocklistLoader;

impl BlocklistLoader {
    pub async fn load(&self, url: &str, kind: BlocklistKind) -> Result<Blocklist, reqwest::Error> {
        tracing::debug!("loading {url:?}");
        let req = reqwest::get(url).await?;
        let text = req.text().await?;
        Ok(Blocklist::from_file(&text, kind))
    }
}

#[cfg(test)]
mod tests {
    use crate::BlocklistKind;

    use super::{hash, parse_hostfile, Blocklist};

    #[test]
    fn parse_simple_hostfile() {
        let data = "0.0.0.0 0.r.msn.com\n0.0.0.0 207.net\n# comment line\n";
        let result = parse_hostfile(data);
        assert!(result.contains("0.r.msn.com"));
        assert!(result.contains("207.net"));
        assert!(!result.contains("#"));
        assert!(!result.contains("0.0.0.0"));
    }

    #[test]
    fn hash_is_stable_sha256_hex() {
        let data = "0.0.0.0 0-app.com\n";
        let digest = hash(data);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, hash(data));
    }

    #[test]
    fn parse_complex() {
        let result = Blocklist::from_file(
            r#"# nope
0.0.0.0 this.is.blocked
0.0.0.0 this.is.also.blocked blocked.again
0.0.0.0 this.is.also.blocked #Youwon'tgetthis
0.0.0.0 this.is.also.blocked # or this"#,
            BlocklistKind::EtcHosts,
        );
        assert!(result.entries.contains("this.is.blocked"));
        assert!(result.entries.contains("this.is.also.blocked"));
        assert!(result.entries.contains("blocked.again"));
        assert!(!result.entries.contains("nope"));
        assert!(!result.entries.contains("Youwon'tgetthis"));
        assert!(!result.entries.contains("or"));
        assert!(!result.entries.contains("this"));
        assert_eq!(result.hash.len(), 64);
    }
}
