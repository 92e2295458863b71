//! Expression evaluation

use super::operators;
use super::{Evaluator, Frame};
use crate::interpreter::errors::{Error, Result};
use crate::interpreter::instrument;
use crate::interpreter::parallel::{ParallelExecutor, TaskFn};
use crate::interpreter::stdlib::{self, methods};
use crate::interpreter::types::{
    BinOp, Callable, Callee, Expr, ParallelTask, ValidateTarget, Val,
};
use indexmap::IndexMap;

impl Evaluator {
    pub fn eval(&self, frame: &mut Frame, expr: &Expr) -> Result<Val> {
        match expr {
            Expr::Literal(value) => Ok(Val::from_json(value)),

            Expr::Name(name) => self.lookup(frame, name),

            Expr::Raw(source) => self.eval_raw(frame, source),

            Expr::Call {
                callee,
                args,
                kwargs,
            } => self.eval_call(frame, callee, args, kwargs),

            Expr::Attr { base, attr } => {
                let base = self.eval(frame, base)?;
                get_attr(base, attr)
            }

            Expr::Index { base, index } => {
                let base = self.eval(frame, base)?;
                let index = self.eval(frame, index)?;
                get_index(&base, &index)
            }

            Expr::List(items) => Ok(Val::List(self.eval_all(frame, items)?)),

            Expr::Tuple(items) => Ok(Val::Tuple(self.eval_all(frame, items)?)),

            Expr::Dict(entries) => {
                let mut map = IndexMap::new();
                for (key, value) in entries {
                    let key = match self.eval(frame, key)? {
                        Val::Str(k) => k,
                        other => {
                            return Err(Error::Type(format!(
                                "dict keys must be str, not {}",
                                other.type_name()
                            )))
                        }
                    };
                    let value = self.eval(frame, value)?;
                    map.insert(key, value);
                }
                Ok(Val::Dict(map))
            }

            Expr::BinOp { op, left, right } => {
                let left = self.eval(frame, left)?;
                match op {
                    BinOp::And if !left.is_truthy() => Ok(left),
                    BinOp::Or if left.is_truthy() => Ok(left),
                    BinOp::And | BinOp::Or => self.eval(frame, right),
                    _ => {
                        let right = self.eval(frame, right)?;
                        operators::apply(*op, &left, &right)
                    }
                }
            }

            Expr::Validate { target, data } => self.eval_validate(frame, target, data),

            Expr::Parallel(tasks) => self.eval_parallel(frame, tasks),
        }
    }

    fn eval_all(&self, frame: &mut Frame, exprs: &[Expr]) -> Result<Vec<Val>> {
        exprs.iter().map(|e| self.eval(frame, e)).collect()
    }

    fn eval_kwargs(&self, frame: &mut Frame, kwargs: &[(String, Expr)]) -> Result<IndexMap<String, Val>> {
        let mut out = IndexMap::new();
        for (name, expr) in kwargs {
            let value = self.eval(frame, expr)?;
            out.insert(name.clone(), value);
        }
        Ok(out)
    }

    /* ===================== Calls ===================== */

    fn eval_call(
        &self,
        frame: &mut Frame,
        callee: &Callee,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Val> {
        // `items.append(x)` on a variable mutates the binding itself
        if let Callee::Expr(callee) = callee {
            if let Expr::Attr { base, attr } = callee.as_ref() {
                if let Expr::Name(var) = base.as_ref() {
                    if methods::is_mutating(attr) {
                        return self.call_in_place(frame, var, attr, args, kwargs);
                    }
                }
            }
        }

        let function = match callee {
            Callee::Name(name) => self.lookup(frame, name)?,
            Callee::Expr(expr) => self.eval(frame, expr)?,
        };
        let args = self.eval_all(frame, args)?;
        let kwargs = self.eval_kwargs(frame, kwargs)?;
        self.call_value(function, args, kwargs)
    }

    fn call_in_place(
        &self,
        frame: &mut Frame,
        var: &str,
        method: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Val> {
        let receiver = self.lookup(frame, var)?;
        if !methods::has_method(&receiver, method) {
            // modules and dicts with a matching key fall back to attribute calls
            let function = get_attr(receiver, method)?;
            let args = self.eval_all(frame, args)?;
            let kwargs = self.eval_kwargs(frame, kwargs)?;
            return self.call_value(function, args, kwargs);
        }

        let args = self.eval_all(frame, args)?;
        let kwargs = self.eval_kwargs(frame, kwargs)?;
        // globals are shared by the run; mutation rebinds the name locally
        let slot = frame.locals.entry(var.to_string()).or_insert(receiver);
        methods::call_method(slot, method, args, kwargs)
    }

    /// Apply a callable value to evaluated arguments
    pub fn call_value(&self, function: Val, args: Vec<Val>, kwargs: IndexMap<String, Val>) -> Result<Val> {
        let Val::Func(callable) = function else {
            return Err(Error::Type(format!(
                "'{}' object is not callable",
                function.type_name()
            )));
        };

        match callable {
            Callable::Step(name) => self.call_step(&name, args, kwargs),
            Callable::Builtin(builtin) => stdlib::call_builtin(builtin, args, kwargs, self.reporter()),
            Callable::Method { mut receiver, name } => {
                methods::call_method(&mut receiver, &name, args, kwargs)
            }
            Callable::Native(function) => (function.func)(args, kwargs),
            Callable::Host { module, member } => {
                let host = self.context().services.host.as_ref().ok_or_else(|| {
                    Error::RawExecution(format!("no host substrate for {}.{}", module, member))
                })?;
                let args = args.iter().map(Val::to_json).collect();
                let kwargs = kwargs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                host.call(&module, &member, args, kwargs)
                    .map(|v| Val::from_json(&v))
                    .map_err(Error::RawExecution)
            }
        }
    }

    /// Bind arguments to parameters and invoke through the instrumentation
    /// wrapper
    pub fn call_step(&self, name: &str, args: Vec<Val>, kwargs: IndexMap<String, Val>) -> Result<Val> {
        let step = self
            .context()
            .program
            .step(name)
            .cloned()
            .ok_or_else(|| Error::Name(format!("step '{}' is not defined", name)))?;

        if args.len() > step.params.len() {
            return Err(Error::Type(format!(
                "step '{}' takes {} positional argument(s) but {} were given",
                name,
                step.params.len(),
                args.len()
            )));
        }

        let mut locals: IndexMap<String, Val> = step.params.iter().cloned().zip(args).collect();
        for (key, value) in kwargs {
            if !step.params.contains(&key) {
                return Err(Error::Type(format!(
                    "step '{}' got an unexpected keyword argument '{}'",
                    name, key
                )));
            }
            if locals.contains_key(&key) {
                return Err(Error::Type(format!(
                    "step '{}' got multiple values for argument '{}'",
                    name, key
                )));
            }
            locals.insert(key, value);
        }
        if let Some(missing) = step.params.iter().find(|p| !locals.contains_key(*p)) {
            return Err(Error::Type(format!(
                "step '{}' missing required argument '{}'",
                name, missing
            )));
        }
        // parameter order, whatever order the keywords came in
        let locals = step
            .params
            .iter()
            .filter_map(|p| locals.shift_remove(p).map(|v| (p.clone(), v)))
            .collect();

        let callee = self.nested(name)?;
        instrument::invoke(&callee, &step, locals)
    }

    /* ===================== Validation ===================== */

    fn eval_validate(&self, frame: &mut Frame, target: &ValidateTarget, data: &Expr) -> Result<Val> {
        let services = &self.context().services;
        let validated = match target {
            ValidateTarget::Schema(schema) => {
                let schema = self.eval(frame, schema)?.to_json();
                let data = self.eval(frame, data)?.to_json();
                services.schemas.validate(&schema, &data)
            }
            ValidateTarget::Model(model) => {
                let model = self.model_name(frame, model)?;
                let data = self.eval(frame, data)?.to_json();
                services.models.validate(&model, &data)
            }
        };
        validated
            .map(|v| Val::from_json(&v))
            .map_err(Error::Validation)
    }

    /// A bare model name refers to the model itself unless it is bound to a
    /// string
    fn model_name(&self, frame: &mut Frame, model: &Expr) -> Result<String> {
        if let Expr::Name(name) = model {
            return Ok(match self.lookup(frame, name) {
                Ok(Val::Str(bound)) => bound,
                _ => name.clone(),
            });
        }
        match self.eval(frame, model)? {
            Val::Str(name) => Ok(name),
            other => Err(Error::Type(format!(
                "model must be a name or string, not {}",
                other.type_name()
            ))),
        }
    }

    /* ===================== Parallel ===================== */

    fn eval_parallel(&self, frame: &mut Frame, tasks: &[ParallelTask]) -> Result<Val> {
        let dispatch: Vec<(String, TaskFn)> = tasks
            .iter()
            .map(|task| {
                let evaluator = self.clone();
                let mut snapshot = frame.clone();
                let call = task.call.clone();
                let run: TaskFn = Box::new(move || evaluator.eval(&mut snapshot, &call));
                (task.name.clone(), run)
            })
            .collect();

        let ctx = self.context();
        let executor = ParallelExecutor::new(
            ctx.handle.clone(),
            ctx.reporter.clone(),
            ctx.settings.parallel_workers,
        );
        executor.run(dispatch).map(Val::Dict)
    }
}

/* ===================== Attributes and Indexing ===================== */

pub fn get_attr(base: Val, attr: &str) -> Result<Val> {
    match base {
        Val::Module(module) => module.members.get(attr).cloned().ok_or_else(|| {
            Error::Attribute(format!(
                "module '{}' has no attribute '{}'",
                module.name, attr
            ))
        }),
        Val::Dict(ref map) if map.contains_key(attr) => Ok(map[attr].clone()),
        Val::Error(ref err) => match attr {
            "kind" => Ok(Val::str(err.kind.as_str())),
            "message" => Ok(Val::str(err.message.as_str())),
            _ => Err(Error::Attribute(format!("'error' object has no attribute '{}'", attr))),
        },
        other if methods::has_method(&other, attr) => Ok(Val::Func(Callable::Method {
            receiver: Box::new(other),
            name: attr.to_string(),
        })),
        other => Err(Error::Attribute(format!(
            "'{}' object has no attribute '{}'",
            other.type_name(),
            attr
        ))),
    }
}

pub fn get_index(base: &Val, index: &Val) -> Result<Val> {
    match (base, index) {
        (Val::List(items) | Val::Tuple(items), Val::Int(i)) => methods::normalize_index(*i, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(|| Error::Index(format!("{} index out of range", base.type_name()))),
        (Val::Str(s), Val::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            methods::normalize_index(*i, chars.len())
                .map(|i| Val::Str(chars[i].to_string()))
                .ok_or_else(|| Error::Index("string index out of range".to_string()))
        }
        (Val::Dict(map), Val::Str(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Index(format!("key '{}' not found", key))),
        (Val::Dict(_), other) => Err(Error::Index(format!(
            "key {} not found",
            other.to_json()
        ))),
        (Val::List(_) | Val::Tuple(_) | Val::Str(_), other) => Err(Error::Type(format!(
            "{} indices must be integers, not {}",
            base.type_name(),
            other.type_name()
        ))),
        (other, _) => Err(Error::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_forms() {
        let list = Val::List(vec![Val::Int(1), Val::Int(2)]);
        assert_eq!(get_index(&list, &Val::Int(-1)).ok(), Some(Val::Int(2)));
        assert_eq!(
            get_index(&list, &Val::Int(2)).map_err(|e| e.kind().to_string()),
            Err("IndexError".to_string())
        );
        assert_eq!(get_index(&Val::str("héllo"), &Val::Int(1)).ok(), Some(Val::str("é")));
        assert_eq!(
            get_index(&list, &Val::str("a")).map_err(|e| e.kind().to_string()),
            Err("TypeError".to_string())
        );
    }

    #[test]
    fn test_attr_prefers_dict_keys_over_methods() {
        let dict = Val::Dict(IndexMap::from([("keys".to_string(), Val::Int(1))]));
        assert_eq!(get_attr(dict, "keys").ok(), Some(Val::Int(1)));

        let dict = Val::Dict(IndexMap::new());
        assert!(matches!(
            get_attr(dict, "keys"),
            Ok(Val::Func(Callable::Method { ref name, .. })) if name == "keys"
        ));
    }

    #[test]
    fn test_attr_on_error_values() {
        let err = Val::Error(crate::interpreter::types::ErrorValue {
            kind: "ValueError".to_string(),
            message: "bad".to_string(),
        });
        assert_eq!(get_attr(err.clone(), "kind").ok(), Some(Val::str("ValueError")));
        assert_eq!(get_attr(err, "message").ok(), Some(Val::str("bad")));
    }
}
