//! Stream Assembler - 音频分块装配
//!
//! 将已解析的音频 payload 切成适合低延迟投递的块序列：
//! - 块大小落在配置的 [min, max] 区间内
//! - 末块带 is_final 标记
//! - 序列惰性、有限、一次性——再次消费需重新请求 payload（此时命中缓存）

use bytes::Bytes;
use futures_util::stream::{self, Stream};

/// 分块配置
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// 目标块大小下限（字节）
    pub min_chunk_bytes: usize,
    /// 目标块大小上限（字节）
    pub max_chunk_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            min_chunk_bytes: 4 * 1024,
            max_chunk_bytes: 32 * 1024,
        }
    }
}

/// 音频块
///
/// 由 ChunkStream 产出，被调用方的流消费者恰好消费一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// 序列号，从 0 递增
    pub index: u32,
    /// 该块的字节范围（payload 的零拷贝切片）
    pub data: Bytes,
    /// 末块标记
    pub is_final: bool,
}

/// 分块装配器
#[derive(Debug, Clone)]
pub struct StreamAssembler {
    config: StreamConfig,
}

impl StreamAssembler {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// 将完整 payload 切为块序列
    ///
    /// 切片以 max 为目标；若末尾残片小于 min 且前面已有块，
    /// 则并入前一块，保证块大小不低于下限
    pub fn assemble(&self, payload: Bytes) -> ChunkStream {
        ChunkStream {
            payload,
            offset: 0,
            index: 0,
            done: false,
            min: self.config.min_chunk_bytes,
            max: self.config.max_chunk_bytes.max(1),
        }
    }
}

/// 惰性块序列
///
/// 对 payload 做零拷贝切片；迭代结束后不可重启
pub struct ChunkStream {
    payload: Bytes,
    offset: usize,
    index: u32,
    done: bool,
    min: usize,
    max: usize,
}

impl ChunkStream {
    /// 适配为 futures Stream（供 HTTP body 使用）
    pub fn into_stream(self) -> impl Stream<Item = AudioChunk> + Send {
        stream::iter(self)
    }
}

impl Iterator for ChunkStream {
    type Item = AudioChunk;

    fn next(&mut self) -> Option<AudioChunk> {
        if self.done {
            return None;
        }

        let total = self.payload.len();
        let remaining = total - self.offset;

        // 空 payload 仍产出一个空末块，保证序列以 is_final 结束
        let mut take = remaining.min(self.max);
        // 若本块之后的残片过小，直接并入本块
        let after = remaining - take;
        if after > 0 && after < self.min {
            take = remaining;
        }

        let data = self.payload.slice(self.offset..self.offset + take);
        self.offset += take;

        let is_final = self.offset >= total;
        if is_final {
            self.done = true;
        }

        let chunk = AudioChunk {
            index: self.index,
            data,
            is_final,
        };
        self.index += 1;
        Some(chunk)
    }
}
