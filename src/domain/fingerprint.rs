//! Synthesis Fingerprint - 内容寻址缓存键
//!
//! 对归一化后的合成参数计算 SHA-256，作为缓存指纹：
//! - 文本先归一化（trim、压缩空白、剥离不发音的结构标记）
//! - 相同的朗读内容共享同一个缓存条目
//! - 各字段以长度前缀分隔，避免字段边界歧义

use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// 指纹派生错误
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Text is empty after normalization")]
    EmptyText,
}

/// 合成指纹
///
/// 由 (归一化文本, voice, model, format) 派生的不可变内容寻址键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// 派生指纹
    ///
    /// 仅当文本归一化后为空时失败
    pub fn derive(
        text: &str,
        voice: &str,
        model: &str,
        format: &str,
    ) -> Result<Self, FingerprintError> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Err(FingerprintError::EmptyText);
        }

        let mut hasher = Sha256::new();
        for field in [normalized.as_str(), voice, model, format] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }

        Ok(Self(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// 十六进制表示（用于存储键与日志）
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 文本归一化
///
/// 使"朗读内容相同"的文本产生相同指纹：
/// 1. 剥离 HTML/XML 风格标签
/// 2. 剥离 Markdown 强调与代码标记（* _ ` ~）
/// 3. 压缩空白、trim
pub fn normalize_text(text: &str) -> String {
    let stripped = strip_markup(text);

    let mut out = String::with_capacity(stripped.len());
    let mut last_was_space = true; // 吞掉前导空白
    for ch in stripped.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }

    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// 剥离不发音的结构标记
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // 标签视作空白，避免相邻词粘连
                out.push(' ');
            }
            _ if in_tag => {}
            '*' | '_' | '`' | '~' | '#' => {}
            _ => out.push(ch),
        }
    }
    out
}
