//! 工具参数校验
//!
//! 支持 JSON Schema 的一个子集：顶层 object、properties.*.type（string / integer / number /
//! boolean / array / object / null，或其数组）、required、enum。
//! 可转换的值会被规范化（"3" -> 3、"true" -> true、数字 -> 字符串），schema 未声明的键原样保留。

use serde_json::{Map, Number, Value};

/// 按 schema 校验并规范化参数；失败时返回可读的原因
pub fn validate_args(schema: &Value, args: &Value) -> Result<Value, String> {
    let mut normalized: Map<String, Value> = match args {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(format!(
                "arguments must be a JSON object, got {}",
                type_name(other)
            ))
        }
    };

    let properties = schema.get("properties").and_then(Value::as_object);
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    for name in &required {
        match normalized.get(*name) {
            None | Some(Value::Null) => {
                return Err(format!("missing required argument '{name}'"));
            }
            _ => {}
        }
    }

    let Some(properties) = properties else {
        return Ok(Value::Object(normalized));
    };

    for (name, value) in normalized.iter_mut() {
        let Some(prop) = properties.get(name) else {
            continue;
        };
        if value.is_null() && !required.contains(&name.as_str()) {
            continue;
        }
        if let Some(ty) = prop.get("type") {
            *value = coerce_any(value, ty)
                .ok_or_else(|| format!("argument '{name}' must be of type {}", describe_type(ty)))?;
        }
        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(format!(
                    "argument '{name}' must be one of {}",
                    Value::Array(allowed.clone())
                ));
            }
        }
    }

    Ok(Value::Object(normalized))
}

fn coerce_any(value: &Value, ty: &Value) -> Option<Value> {
    match ty {
        Value::String(t) => coerce(value, t),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find_map(|t| coerce(value, t)),
        _ => Some(value.clone()),
    }
}

fn coerce(value: &Value, ty: &str) -> Option<Value> {
    match (ty, value) {
        ("string", Value::String(_)) => Some(value.clone()),
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),

        ("integer", Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Some(value.clone())
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| Value::Number(Number::from(f as i64)))
            }
        }
        ("integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(|i| Value::Number(i.into())),

        ("number", Value::Number(_)) => Some(value.clone()),
        ("number", Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),

        ("boolean", Value::Bool(_)) => Some(value.clone()),
        ("boolean", Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },

        ("array", Value::Array(_)) => Some(value.clone()),
        ("object", Value::Object(_)) => Some(value.clone()),
        ("null", Value::Null) => Some(Value::Null),

        ("string" | "integer" | "number" | "boolean" | "array" | "object" | "null", _) => None,
        // 未知类型关键字不做约束
        _ => Some(value.clone()),
    }
}

fn describe_type(ty: &Value) -> String {
    match ty {
        Value::String(t) => t.clone(),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "limit": { "type": "integer" },
                "ratio": { "type": "number" },
                "verbose": { "type": "boolean" },
                "lang": { "type": "string", "enum": ["en", "fr"] }
            },
            "required": ["url"]
        })
    }

    #[test]
    fn test_missing_required() {
        let err = validate_args(&schema(), &json!({"limit": 3})).unwrap_err();
        assert_eq!(err, "missing required argument 'url'");

        let err = validate_args(&schema(), &json!({"url": null})).unwrap_err();
        assert!(err.contains("url"));
    }

    #[test]
    fn test_coercion() {
        let out = validate_args(
            &schema(),
            &json!({"url": 42, "limit": "7", "ratio": "0.5", "verbose": "TRUE"}),
        )
        .unwrap();
        assert_eq!(out["url"], json!("42"));
        assert_eq!(out["limit"], json!(7));
        assert_eq!(out["ratio"], json!(0.5));
        assert_eq!(out["verbose"], json!(true));
    }

    #[test]
    fn test_type_mismatch() {
        let err = validate_args(&schema(), &json!({"url": "x", "limit": "many"})).unwrap_err();
        assert_eq!(err, "argument 'limit' must be of type integer");

        let err = validate_args(&schema(), &json!({"url": ["a"]})).unwrap_err();
        assert!(err.contains("'url'"));
    }

    #[test]
    fn test_enum_and_extra_keys() {
        let out = validate_args(&schema(), &json!({"url": "x", "lang": "en", "extra": 1})).unwrap();
        assert_eq!(out["extra"], json!(1));

        let err = validate_args(&schema(), &json!({"url": "x", "lang": "de"})).unwrap_err();
        assert!(err.contains("must be one of"));
    }

    #[test]
    fn test_non_object_arguments() {
        let err = validate_args(&schema(), &json!("https://youtu.be/x")).unwrap_err();
        assert!(err.contains("got string"));
        // null 视为空对象
        let no_required = json!({"type": "object", "properties": {}});
        assert_eq!(validate_args(&no_required, &Value::Null).unwrap(), json!({}));
    }

    #[test]
    fn test_union_type() {
        let schema = json!({"properties": {"n": {"type": ["integer", "null"]}}});
        assert_eq!(validate_args(&schema, &json!({"n": "5"})).unwrap()["n"], json!(5));
        assert!(validate_args(&schema, &json!({"n": true})).is_err());
    }
}
