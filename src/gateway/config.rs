//! 网关配置

use envconfig::Envconfig;
use http::{HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::strip_prefix;
use crate::error::{Result, ServerError};

/// 网关 JSON 输出选项
///
/// `multiline`、`indent` 与 `emit_unpopulated` 由 [`JsonConfig::render`] 直接生效；
/// `use_proto_names`、`use_enum_numbers`、`allow_partial` 交给注册方自己的序列化逻辑。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct JsonConfig {
    pub use_proto_names: bool,
    pub emit_unpopulated: bool,
    pub use_enum_numbers: bool,
    pub allow_partial: bool,
    pub multiline: bool,
    pub indent: String,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            use_proto_names: true,
            emit_unpopulated: true,
            use_enum_numbers: true,
            allow_partial: true,
            multiline: true,
            indent: "  ".to_string(),
        }
    }
}

#[derive(Envconfig)]
struct JsonEnv {
    #[envconfig(from = "GATEWAY_USE_PROTO_NAMES", default = "true")]
    use_proto_names: bool,
    #[envconfig(from = "GATEWAY_EMIT_UNPOPULATED", default = "true")]
    emit_unpopulated: bool,
    #[envconfig(from = "GATEWAY_USE_ENUM_NUMBERS", default = "true")]
    use_enum_numbers: bool,
    #[envconfig(from = "GATEWAY_ALLOW_PARTIAL", default = "true")]
    allow_partial: bool,
    #[envconfig(from = "GATEWAY_MULTILINE", default = "true")]
    multiline: bool,
    #[envconfig(from = "GATEWAY_INDENT", default = "  ")]
    indent: String,
}

impl JsonConfig {
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env = JsonEnv::init_from_hashmap(&strip_prefix(prefix, vars))
            .map_err(|e| ServerError::config(e.to_string()))?;
        Ok(Self {
            use_proto_names: env.use_proto_names,
            emit_unpopulated: env.emit_unpopulated,
            use_enum_numbers: env.use_enum_numbers,
            allow_partial: env.allow_partial,
            multiline: env.multiline,
            indent: env.indent,
        })
    }

    /// 按当前选项序列化
    pub fn render<T: Serialize + ?Sized>(&self, value: &T) -> serde_json::Result<Vec<u8>> {
        let mut value = serde_json::to_value(value)?;
        if !self.emit_unpopulated {
            strip_nulls(&mut value);
        }

        if !self.multiline {
            return serde_json::to_vec(&value);
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(self.indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value.serialize(&mut serializer)?;
        Ok(buf)
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// 网关 CORS 选项
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsOptions {
    /// 包含 `*` 时允许任意来源
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: Option<u64>,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["*".to_string()],
            allow_credentials: false,
            max_age_secs: None,
        }
    }
}

impl CorsOptions {
    pub fn to_layer(&self) -> Result<CorsLayer> {
        let wildcard = self.allowed_origins.iter().any(|o| o == "*")
            || self.allowed_headers.iter().any(|h| h == "*");
        if self.allow_credentials && wildcard {
            return Err(ServerError::config(
                "CORS credentials cannot be combined with wildcard origins or headers",
            ));
        }

        let mut layer = CorsLayer::new();

        layer = if self.allowed_origins.iter().any(|o| o == "*") {
            layer.allow_origin(Any)
        } else {
            let origins = self
                .allowed_origins
                .iter()
                .map(|o| {
                    HeaderValue::from_str(o)
                        .map_err(|e| ServerError::config(format!("invalid CORS origin {o}: {e}")))
                })
                .collect::<Result<Vec<_>>>()?;
            layer.allow_origin(AllowOrigin::list(origins))
        };

        let methods = self
            .allowed_methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|e| ServerError::config(format!("invalid CORS method {m}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        layer = layer.allow_methods(methods);

        layer = if self.allowed_headers.iter().any(|h| h == "*") {
            layer.allow_headers(Any)
        } else {
            let headers = self
                .allowed_headers
                .iter()
                .map(|h| {
                    HeaderName::from_bytes(h.as_bytes())
                        .map_err(|e| ServerError::config(format!("invalid CORS header {h}: {e}")))
                })
                .collect::<Result<Vec<_>>>()?;
            layer.allow_headers(headers)
        };

        if self.allow_credentials {
            layer = layer.allow_credentials(true);
        }
        if let Some(secs) = self.max_age_secs {
            layer = layer.max_age(std::time::Duration::from_secs(secs));
        }
        Ok(layer)
    }
}
