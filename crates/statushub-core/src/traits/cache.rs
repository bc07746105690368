//! Cache provider trait for pluggable caching backends.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::events::InvalidationTopic;
use crate::result::AppResult;

/// Frame tag for values written through a type's compact encoding.
const TAG_FAST: u8 = 0x01;
/// Frame tag for values written as JSON.
const TAG_GENERIC: u8 = 0x00;

/// Trait for cache backends (Redis or in-memory).
///
/// Values are opaque bytes; typed access goes through [`CacheProviderExt`].
/// A provider owns one logical namespace (its [`name`](Self::name)) and is
/// responsible for key prefixing and TTL enforcement.
#[async_trait]
pub trait CacheProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Logical namespace of this cache.
    fn name(&self) -> &str;

    /// Cluster topic on which remote invalidations for this cache arrive.
    fn invalidate_cluster_event(&self) -> InvalidationTopic;

    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    ///
    /// An `Err` means the lookup itself failed and the caller must treat
    /// the key as unknown, not as missing.
    async fn get(&self, key: &str) -> AppResult<Option<Bytes>>;

    /// Set a value without expiry. Overwrites any previous value.
    async fn set(&self, key: &str, value: Bytes) -> AppResult<()>;

    /// Set a value with an explicit TTL. Overwrites any previous value.
    async fn set_with_expiry(&self, key: &str, value: Bytes, ttl: Duration) -> AppResult<()>;

    /// Set a value with the cache's default TTL.
    async fn set_with_default_expiry(&self, key: &str, value: Bytes) -> AppResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> AppResult<()>;

    /// Remove every key owned by this cache's namespace.
    async fn purge(&self) -> AppResult<()>;

    /// List the keys of this namespace, without the namespace prefix.
    ///
    /// Not cheap on networked backends; keep it off hot paths.
    async fn keys(&self) -> AppResult<Vec<String>>;

    /// Number of live entries in this namespace.
    async fn len(&self) -> AppResult<usize>;

    /// Whether this namespace holds no entries.
    async fn is_empty(&self) -> AppResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Check that the cache backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

/// Serialization capability for values stored in a cache.
///
/// Every cacheable type gets the generic JSON encoding for free. Hot
/// record types additionally override [`encode_fast`](Self::encode_fast)
/// and [`decode_fast`](Self::decode_fast) with a compact binary layout;
/// the cache picks the fast path whenever the value offers one.
pub trait CacheCodec: Serialize + DeserializeOwned + Send + Sync {
    /// Compact binary encoding, or `None` when the type has none.
    fn encode_fast(&self) -> Option<Bytes> {
        None
    }

    /// Inverse of [`encode_fast`](Self::encode_fast).
    fn decode_fast(_buf: &[u8]) -> Option<AppResult<Self>> {
        None
    }

    /// Encode a value into a tagged cache frame.
    fn encode_frame(&self) -> AppResult<Bytes> {
        let mut out = BytesMut::new();
        match self.encode_fast() {
            Some(fast) => {
                out.put_u8(TAG_FAST);
                out.put_slice(&fast);
            }
            None => {
                out.put_u8(TAG_GENERIC);
                out.put_slice(&serde_json::to_vec(self)?);
            }
        }
        Ok(out.freeze())
    }

    /// Decode a tagged cache frame.
    fn decode_frame(frame: &[u8]) -> AppResult<Self> {
        let Some((&tag, body)) = frame.split_first() else {
            return Err(AppError::serialization("Empty cache frame"));
        };
        match tag {
            TAG_FAST => Self::decode_fast(body).unwrap_or_else(|| {
                Err(AppError::serialization(
                    "Cache frame uses a compact encoding this type does not provide",
                ))
            }),
            TAG_GENERIC => Ok(serde_json::from_slice(body)?),
            other => Err(AppError::serialization(format!(
                "Unknown cache frame tag {other:#04x}"
            ))),
        }
    }
}

impl CacheCodec for String {}

impl CacheCodec for serde_json::Value {}

/// Typed access on top of any [`CacheProvider`], including trait objects.
#[async_trait]
pub trait CacheProviderExt: CacheProvider {
    /// Get and decode a typed value.
    async fn get_value<T: CacheCodec>(&self, key: &str) -> AppResult<Option<T>> {
        match self.get(key).await? {
            Some(frame) => Ok(Some(T::decode_frame(&frame)?)),
            None => Ok(None),
        }
    }

    /// Encode and store a typed value without expiry.
    async fn set_value<T: CacheCodec>(&self, key: &str, value: &T) -> AppResult<()> {
        let frame = value.encode_frame()?;
        self.set(key, frame).await
    }

    /// Encode and store a typed value with the default TTL.
    async fn set_value_with_default_expiry<T: CacheCodec>(
        &self,
        key: &str,
        value: &T,
    ) -> AppResult<()> {
        let frame = value.encode_frame()?;
        self.set_with_default_expiry(key, frame).await
    }

    /// Encode and store a typed value with an explicit TTL.
    async fn set_value_with_expiry<T: CacheCodec>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        let frame = value.encode_frame()?;
        self.set_with_expiry(key, frame, ttl).await
    }
}

impl<P: CacheProvider + ?Sized> CacheProviderExt for P {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Plain {
        name: String,
    }

    impl CacheCodec for Plain {}

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Counter(u32);

    impl CacheCodec for Counter {
        fn encode_fast(&self) -> Option<Bytes> {
            Some(Bytes::copy_from_slice(&self.0.to_be_bytes()))
        }

        fn decode_fast(buf: &[u8]) -> Option<AppResult<Self>> {
            let raw: [u8; 4] = match buf.try_into() {
                Ok(raw) => raw,
                Err(_) => return Some(Err(AppError::serialization("bad counter"))),
            };
            Some(Ok(Self(u32::from_be_bytes(raw))))
        }
    }

    #[test]
    fn test_generic_frame_is_json() {
        let frame = Plain {
            name: "town-square".into(),
        }
        .encode_frame()
        .unwrap();
        assert_eq!(frame[0], TAG_GENERIC);
        assert_eq!(&frame[1..], br#"{"name":"town-square"}"#);
    }

    #[test]
    fn test_fast_frame_selected_when_available() {
        let frame = Counter(7).encode_frame().unwrap();
        assert_eq!(frame.as_ref(), &[TAG_FAST, 0, 0, 0, 7]);
        assert_eq!(Counter::decode_frame(&frame).unwrap(), Counter(7));
    }

    #[test]
    fn test_fast_frame_rejected_by_type_without_fast_path() {
        let err = Plain::decode_frame(&[TAG_FAST, 1, 2]).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Serialization);
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert!(String::decode_frame(&[]).is_err());
    }
}
