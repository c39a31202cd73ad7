//! The `fes:Function` registry (SPEC_FULL.md §4.4): name, arity, and a
//! constant-folding evaluator over literal arguments.
//!
//! Full per-row function evaluation (a function of a property value rather
//! than of literals) is out of scope for the reference datastore; functions
//! are resolved at compile time against literal arguments only, which covers
//! the common case of a filter computing a constant (`length('x')`,
//! `concat('a','b')`) to compare against a property.

use std::collections::HashMap;

use crate::error::WfsError;
use crate::xsd::FieldValue;

type Evaluator = fn(&[FieldValue]) -> Result<FieldValue, String>;

#[derive(Clone, Copy)]
pub struct FunctionSignature {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    eval: Evaluator,
}

fn as_f64(v: &FieldValue) -> Result<f64, String> {
    match v {
        FieldValue::Double(d) => Ok(*d),
        FieldValue::Integer(i) => Ok(*i as f64),
        FieldValue::String(s) => s.parse().map_err(|_| format!("'{s}' is not numeric")),
        _ => Err("expected a numeric argument".to_string()),
    }
}

fn as_str(v: &FieldValue) -> Result<String, String> {
    match v {
        FieldValue::String(s) => Ok(s.clone()),
        FieldValue::Integer(i) => Ok(i.to_string()),
        FieldValue::Double(d) => Ok(d.to_string()),
        _ => Err("expected a string argument".to_string()),
    }
}

fn builtin_lower(args: &[FieldValue]) -> Result<FieldValue, String> {
    Ok(FieldValue::String(as_str(&args[0])?.to_lowercase()))
}

fn builtin_upper(args: &[FieldValue]) -> Result<FieldValue, String> {
    Ok(FieldValue::String(as_str(&args[0])?.to_uppercase()))
}

fn builtin_concat(args: &[FieldValue]) -> Result<FieldValue, String> {
    let mut out = String::new();
    for a in args {
        out.push_str(&as_str(a)?);
    }
    Ok(FieldValue::String(out))
}

fn builtin_length(args: &[FieldValue]) -> Result<FieldValue, String> {
    Ok(FieldValue::Integer(as_str(&args[0])?.chars().count() as i64))
}

fn builtin_abs(args: &[FieldValue]) -> Result<FieldValue, String> {
    Ok(FieldValue::Double(as_f64(&args[0])?.abs()))
}

fn builtin_sqrt(args: &[FieldValue]) -> Result<FieldValue, String> {
    Ok(FieldValue::Double(as_f64(&args[0])?.sqrt()))
}

/// Registry of `fes:Function` names recognized by the compiler. Construct
/// with `FunctionRegistry::with_builtins()` and extend via `register` for
/// project-specific functions.
pub struct FunctionRegistry {
    signatures: HashMap<&'static str, FunctionSignature>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry { signatures: HashMap::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = FunctionRegistry::new();
        registry.register("lower", 1, 1, builtin_lower);
        registry.register("upper", 1, 1, builtin_upper);
        registry.register("concat", 1, usize::MAX, builtin_concat);
        registry.register("length", 1, 1, builtin_length);
        registry.register("abs", 1, 1, builtin_abs);
        registry.register("sqrt", 1, 1, builtin_sqrt);
        registry
    }

    pub fn register(&mut self, name: &'static str, min_args: usize, max_args: usize, eval: Evaluator) {
        self.signatures.insert(name, FunctionSignature { name, min_args, max_args, eval });
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.signatures.contains_key(name)
    }

    /// Look up and evaluate `name(args)`, checking arity before calling.
    pub fn call(&self, name: &str, args: &[FieldValue]) -> Result<FieldValue, WfsError> {
        let sig = self
            .signatures
            .get(name)
            .ok_or_else(|| WfsError::invalid_parameter(format!("unknown function '{name}'")))?;
        if args.len() < sig.min_args || args.len() > sig.max_args {
            return Err(WfsError::invalid_parameter(format!(
                "function '{name}' expects {}..{} arguments, got {}",
                sig.min_args,
                sig.max_args,
                args.len()
            )));
        }
        (sig.eval)(args).map_err(WfsError::processing_failed)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_joins_string_arguments() {
        let registry = FunctionRegistry::with_builtins();
        let result = registry
            .call("concat", &[FieldValue::String("Caf".to_string()), FieldValue::String("e".to_string())])
            .unwrap();
        assert_eq!(result, FieldValue::String("Cafe".to_string()));
    }

    #[test]
    fn arity_mismatch_is_invalid_parameter() {
        let registry = FunctionRegistry::with_builtins();
        let err = registry.call("lower", &[]).unwrap_err();
        assert_eq!(err.exception_code(), "InvalidParameterValue");
    }

    #[test]
    fn unknown_function_is_invalid_parameter() {
        let registry = FunctionRegistry::with_builtins();
        let err = registry.call("bogus", &[FieldValue::Integer(1)]).unwrap_err();
        assert_eq!(err.exception_code(), "InvalidParameterValue");
    }

    #[test]
    fn length_counts_characters() {
        let registry = FunctionRegistry::with_builtins();
        let result = registry.call("length", &[FieldValue::String("cafe".to_string())]).unwrap();
        assert_eq!(result, FieldValue::Integer(4));
    }
}
