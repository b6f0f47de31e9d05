//! 候補リスト・スキーマ・解決済みエンティティのキャッシュ
//!
//! 全ての読み出しは stale-while-revalidate で、TTL 超過後もしばらくは
//! `is_stale = true` の値を返す。更新は呼び出し側がバックグラウンドで行う。

mod file_store;
mod lookup;
mod store;

pub use file_store::FileCacheStore;
pub use lookup::{Cached, LookupCache, MAX_TTL_SECONDS};
pub use store::{CacheEntry, CacheStore, MemoryCacheStore, StoredEntry};
