use super::*;

/// Digest algorithms accepted for content addressing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Length in bytes of the digests this algorithm produces.
    #[must_use]
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = StoreError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(StoreError::UnknownAlgorithm(value.to_string())),
        }
    }
}

/// Raw digest bytes identifying one payload.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(Vec<u8>);

impl ContentHash {
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex-encoded digest (case-insensitive).
    pub fn from_hex(value: &str) -> std::result::Result<Self, StoreError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidDigest(value.to_string()));
        }
        hex::decode(trimmed)
            .map(Self)
            .map_err(|_| StoreError::InvalidDigest(value.to_string()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = StoreError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_hex(value)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental hasher over whichever algorithm the store is configured with.
pub(crate) enum StreamHasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl StreamHasher {
    pub(crate) fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => Self::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    pub(crate) fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(bytes),
            Self::Sha384(h) => h.update(bytes),
            Self::Sha512(h) => h.update(bytes),
        }
    }

    pub(crate) fn finalize(self) -> ContentHash {
        match self {
            Self::Sha256(h) => ContentHash(h.finalize().to_vec()),
            Self::Sha384(h) => ContentHash(h.finalize().to_vec()),
            Self::Sha512(h) => ContentHash(h.finalize().to_vec()),
        }
    }
}

/// Reader adapter that hashes everything flowing through it.
pub(crate) struct HashingReader<R> {
    inner: R,
    hasher: StreamHasher,
    bytes: u64,
}

impl<R: Read> HashingReader<R> {
    pub(crate) fn new(inner: R, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            hasher: StreamHasher::new(algorithm),
            bytes: 0,
        }
    }

    pub(crate) fn finish(self) -> (ContentHash, u64) {
        (self.hasher.finalize(), self.bytes)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        self.bytes += read as u64;
        Ok(read)
    }
}

#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> ContentHash {
    let mut hasher = StreamHasher::new(algorithm);
    hasher.update(bytes);
    hasher.finalize()
}

/// Hash a stream through a bounded buffer, returning the digest and the
/// number of bytes consumed.
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, mut reader: R) -> Result<(ContentHash, u64)> {
    let mut hasher = StreamHasher::new(algorithm);
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("failed to read stream for hashing"),
        };
        hasher.update(&buf[..read]);
        total += read as u64;
    }
    Ok((hasher.finalize(), total))
}

pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> Result<(ContentHash, u64)> {
    let file =
        File::open(path).with_context(|| format!("failed to open {} for hashing", path.display()))?;
    hash_reader(algorithm, file).with_context(|| format!("failed to hash {}", path.display()))
}
