//! The standard-library oracle used by the anonymizer.
//!
//! Two questions get asked of it: is a package path part of the Go standard
//! library, and does a path tail like `runtime/proc.go` name a stdlib source
//! file. The package set is embedded so the tool works without a Go
//! installation; when `GOROOT` points at one, source-file checks consult the
//! real tree instead of the heuristic.

use std::collections::HashSet;
use std::path::PathBuf;

pub struct StdlibIndex {
    packages: HashSet<&'static str>,
    goroot: Option<PathBuf>,
}

impl StdlibIndex {
    /// Builds the index, taking the runtime root from the `GOROOT`
    /// environment variable when set.
    pub fn new() -> Self {
        Self::with_goroot(std::env::var_os("GOROOT").map(PathBuf::from))
    }

    pub fn with_goroot(goroot: Option<PathBuf>) -> Self {
        StdlibIndex {
            packages: STDLIB_PACKAGES.iter().copied().collect(),
            goroot,
        }
    }

    /// True if `pkg` is a standard-library import path.
    pub fn is_package(&self, pkg: &[u8]) -> bool {
        match std::str::from_utf8(pkg) {
            Ok(pkg) => self.packages.contains(pkg),
            Err(_) => false,
        }
    }

    /// True if `tail` (a path relative to `$GOROOT/src`) names a
    /// standard-library source file. With a `GOROOT` available this is a
    /// real file check; otherwise the tail must be a `.go` file directly
    /// inside a known stdlib package directory.
    pub fn is_source_file(&self, tail: &[u8]) -> bool {
        let Ok(tail) = std::str::from_utf8(tail) else {
            return false;
        };
        if let Some(goroot) = &self.goroot {
            return goroot
                .join("src")
                .join(tail)
                .metadata()
                .map(|m| m.is_file())
                .unwrap_or(false);
        }
        match tail.rsplit_once('/') {
            Some((dir, file)) => file.ends_with(".go") && self.packages.contains(dir),
            None => false,
        }
    }
}

impl Default for StdlibIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Import paths of the Go 1.19 standard library, internal packages
/// included; function names in traces are prefixed with these.
static STDLIB_PACKAGES: &[&str] = &[
    "archive/tar",
    "archive/zip",
    "bufio",
    "bytes",
    "compress/bzip2",
    "compress/flate",
    "compress/gzip",
    "compress/lzw",
    "compress/zlib",
    "container/heap",
    "container/list",
    "container/ring",
    "context",
    "crypto",
    "crypto/aes",
    "crypto/cipher",
    "crypto/des",
    "crypto/dsa",
    "crypto/ecdsa",
    "crypto/ed25519",
    "crypto/elliptic",
    "crypto/hmac",
    "crypto/md5",
    "crypto/rand",
    "crypto/rc4",
    "crypto/rsa",
    "crypto/sha1",
    "crypto/sha256",
    "crypto/sha512",
    "crypto/subtle",
    "crypto/tls",
    "crypto/x509",
    "crypto/x509/pkix",
    "database/sql",
    "database/sql/driver",
    "debug/buildinfo",
    "debug/dwarf",
    "debug/elf",
    "debug/gosym",
    "debug/macho",
    "debug/pe",
    "debug/plan9obj",
    "embed",
    "encoding",
    "encoding/ascii85",
    "encoding/asn1",
    "encoding/base32",
    "encoding/base64",
    "encoding/binary",
    "encoding/csv",
    "encoding/gob",
    "encoding/hex",
    "encoding/json",
    "encoding/pem",
    "encoding/xml",
    "errors",
    "expvar",
    "flag",
    "fmt",
    "go/ast",
    "go/build",
    "go/build/constraint",
    "go/constant",
    "go/doc",
    "go/doc/comment",
    "go/format",
    "go/importer",
    "go/parser",
    "go/printer",
    "go/scanner",
    "go/token",
    "go/types",
    "hash",
    "hash/adler32",
    "hash/crc32",
    "hash/crc64",
    "hash/fnv",
    "hash/maphash",
    "html",
    "html/template",
    "image",
    "image/color",
    "image/color/palette",
    "image/draw",
    "image/gif",
    "image/jpeg",
    "image/png",
    "index/suffixarray",
    "internal/abi",
    "internal/buildcfg",
    "internal/bytealg",
    "internal/cpu",
    "internal/fmtsort",
    "internal/fuzz",
    "internal/goarch",
    "internal/godebug",
    "internal/goexperiment",
    "internal/goos",
    "internal/goroot",
    "internal/goversion",
    "internal/intern",
    "internal/itoa",
    "internal/lazyregexp",
    "internal/nettrace",
    "internal/oserror",
    "internal/poll",
    "internal/race",
    "internal/reflectlite",
    "internal/singleflight",
    "internal/syscall/execenv",
    "internal/syscall/unix",
    "internal/syscall/windows",
    "internal/sysinfo",
    "internal/testlog",
    "internal/unsafeheader",
    "io",
    "io/fs",
    "io/ioutil",
    "log",
    "log/syslog",
    "math",
    "math/big",
    "math/bits",
    "math/cmplx",
    "math/rand",
    "mime",
    "mime/multipart",
    "mime/quotedprintable",
    "net",
    "net/http",
    "net/http/cgi",
    "net/http/cookiejar",
    "net/http/fcgi",
    "net/http/httptest",
    "net/http/httptrace",
    "net/http/httputil",
    "net/http/internal",
    "net/http/pprof",
    "net/mail",
    "net/netip",
    "net/rpc",
    "net/rpc/jsonrpc",
    "net/smtp",
    "net/textproto",
    "net/url",
    "os",
    "os/exec",
    "os/signal",
    "os/user",
    "path",
    "path/filepath",
    "plugin",
    "reflect",
    "regexp",
    "regexp/syntax",
    "runtime",
    "runtime/cgo",
    "runtime/debug",
    "runtime/internal/atomic",
    "runtime/internal/math",
    "runtime/internal/sys",
    "runtime/internal/syscall",
    "runtime/metrics",
    "runtime/pprof",
    "runtime/race",
    "runtime/trace",
    "sort",
    "strconv",
    "strings",
    "sync",
    "sync/atomic",
    "syscall",
    "testing",
    "testing/fstest",
    "testing/iotest",
    "testing/quick",
    "text/scanner",
    "text/tabwriter",
    "text/template",
    "text/template/parse",
    "time",
    "time/tzdata",
    "unicode",
    "unicode/utf16",
    "unicode/utf8",
    "unsafe",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_package_membership() {
        let index = StdlibIndex::with_goroot(None);
        assert!(index.is_package(b"encoding/json"));
        assert!(index.is_package(b"runtime"));
        assert!(!index.is_package(b"main"));
        assert!(!index.is_package(b"github.com/acme/app"));
        assert!(!index.is_package(b"\xff\xfe"));
    }

    #[test]
    fn test_source_file_fallback() {
        let index = StdlibIndex::with_goroot(None);
        assert!(index.is_source_file(b"runtime/proc.go"));
        assert!(index.is_source_file(b"encoding/json/decode.go"));
        assert!(!index.is_source_file(b"runtime/foo/proc.go"));
        assert!(!index.is_source_file(b"main.go"));
        assert!(!index.is_source_file(b"runtime/proc.c"));
        assert!(!index.is_source_file(b""));
    }

    #[test]
    fn test_source_file_with_goroot() {
        let goroot = tempfile::tempdir().unwrap();
        fs::create_dir_all(goroot.path().join("src/runtime")).unwrap();
        fs::write(goroot.path().join("src/runtime/proc.go"), "package runtime\n").unwrap();

        let index = StdlibIndex::with_goroot(Some(goroot.path().to_path_buf()));
        assert!(index.is_source_file(b"runtime/proc.go"));
        assert!(!index.is_source_file(b"runtime/missing.go"));
        // Directories are not source files.
        assert!(!index.is_source_file(b"runtime"));
    }
}
