//! Placeholder arguments for calling a candidate without concrete inputs.
//!
//! A candidate is evaluated as if called from unknown code: every formal
//! parameter and the receiver become fresh abstract values. Only simple
//! identifier parameters can be given a placeholder; anything else is a
//! hard limitation reported to the caller.

use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::heap::{AbstractId, AbstractType, AbstractValue, CallableId};
use crate::span::SourceLocation;
use crate::substrate::{ArgumentShape, CallExpression, FunctionSignature, ParameterPattern};

/// A formal parameter that is not a simple name.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsupportedParameter {
    pub index: usize,
    pub pattern: ParameterPattern,
    pub location: SourceLocation,
}

impl UnsupportedParameter {
    pub fn to_diagnostic(&self, function_name: &str) -> Diagnostic {
        Diagnostic::fatal(
            ErrorCode::UnsupportedParameterPattern,
            format!(
                "Non-identifier args to optimized functions unsupported: parameter #{} of {} is a {}",
                self.index,
                function_name,
                self.pattern.descr()
            ),
            Some(self.location.clone()),
        )
    }
}

/// Builds call expressions with placeholder inputs.
///
/// Placeholder ids come from a counter owned by the synthesizer, so two
/// calls never share a placeholder. The heap is never touched.
#[derive(Debug, Default)]
pub struct ArgumentSynthesizer {
    next_id: u32,
}

impl ArgumentSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of placeholders created so far.
    pub fn created(&self) -> u32 {
        self.next_id
    }

    /// Build a call of `callable` with one placeholder per parameter plus a
    /// `this` placeholder.
    ///
    /// All parameters are checked before any placeholder is allocated.
    pub fn synthesize(
        &mut self,
        callable: CallableId,
        signature: &FunctionSignature,
        shape: Option<&ArgumentShape>,
    ) -> Result<CallExpression, UnsupportedParameter> {
        let mut names = Vec::with_capacity(signature.params.len());
        for (index, param) in signature.params.iter().enumerate() {
            match &param.pattern {
                ParameterPattern::Simple(name) => names.push(name.as_str()),
                other => {
                    let location = if param.span.is_dummy() {
                        signature.location.clone()
                    } else {
                        SourceLocation::new(signature.location.file.clone(), param.span)
                    };
                    return Err(UnsupportedParameter {
                        index,
                        pattern: other.clone(),
                        location,
                    });
                }
            }
        }

        let args = names
            .into_iter()
            .map(|name| {
                let ty = shape
                    .and_then(|s| s.params.get(name).copied())
                    .unwrap_or_default();
                self.placeholder(name, ty, &signature.location)
            })
            .collect();
        let receiver_ty = shape
            .and_then(|s| s.receiver)
            .unwrap_or(AbstractType::Object);
        let receiver = self.placeholder("this", receiver_ty, &signature.location);

        Ok(CallExpression {
            callee: callable,
            receiver,
            args,
            location: signature.location.clone(),
        })
    }

    fn placeholder(&mut self, name: &str, ty: AbstractType, location: &SourceLocation) -> AbstractValue {
        let id = AbstractId::new(self.next_id);
        self.next_id += 1;
        AbstractValue {
            id,
            name: name.to_string(),
            location: location.clone(),
            ty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;
    use crate::substrate::FormalParameter;

    fn signature(params: Vec<FormalParameter>) -> FunctionSignature {
        FunctionSignature {
            name: Some("render".into()),
            params,
            location: SourceLocation::new("app.js", Span::new(0, 30, 1, 1)),
        }
    }

    #[test]
    fn test_one_placeholder_per_parameter_plus_receiver() {
        let mut synth = ArgumentSynthesizer::new();
        let sig = signature(vec![FormalParameter::simple("a"), FormalParameter::simple("b")]);
        let call = synth.synthesize(CallableId::new(1), &sig, None).unwrap();
        assert_eq!(call.callee, CallableId::new(1));
        let names: Vec<_> = call.args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(call.receiver.name, "this");
        assert_eq!(call.receiver.ty, AbstractType::Object);
        assert!(call.args.iter().all(|a| a.ty == AbstractType::Unknown));
        assert!(call.args.iter().all(|a| a.location == sig.location));
        assert_eq!(synth.created(), 3);
    }

    #[test]
    fn test_shape_refines_types() {
        let mut synth = ArgumentSynthesizer::new();
        let sig = signature(vec![FormalParameter::simple("props"), FormalParameter::simple("n")]);
        let shape = ArgumentShape::new()
            .param("props", AbstractType::Object)
            .receiver(AbstractType::Unknown);
        let call = synth.synthesize(CallableId::new(2), &sig, Some(&shape)).unwrap();
        assert_eq!(call.args[0].ty, AbstractType::Object);
        assert_eq!(call.args[1].ty, AbstractType::Unknown);
        assert_eq!(call.receiver.ty, AbstractType::Unknown);
    }

    #[test]
    fn test_placeholders_are_fresh_across_calls() {
        let mut synth = ArgumentSynthesizer::new();
        let sig = signature(vec![FormalParameter::simple("a")]);
        let first = synth.synthesize(CallableId::new(1), &sig, None).unwrap();
        let second = synth.synthesize(CallableId::new(1), &sig, None).unwrap();
        assert_ne!(first.args[0].id, second.args[0].id);
        assert_ne!(first.receiver.id, second.receiver.id);
    }

    #[test]
    fn test_destructuring_rejected_before_allocation() {
        let mut synth = ArgumentSynthesizer::new();
        let pattern = FormalParameter {
            pattern: ParameterPattern::ObjectPattern,
            span: Span::new(16, 22, 1, 17),
        };
        let sig = signature(vec![FormalParameter::simple("a"), pattern]);
        let err = synth.synthesize(CallableId::new(3), &sig, None).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.location.span.start, 16);
        assert_eq!(synth.created(), 0);
        let diag = err.to_diagnostic("render");
        assert_eq!(diag.code, ErrorCode::UnsupportedParameterPattern);
        assert!(diag.message.contains("object destructuring pattern"));
    }

    #[test]
    fn test_rest_parameter_rejected() {
        let mut synth = ArgumentSynthesizer::new();
        let rest = FormalParameter {
            pattern: ParameterPattern::Rest("xs".into()),
            span: Span::dummy(),
        };
        let sig = signature(vec![rest]);
        let err = synth.synthesize(CallableId::new(4), &sig, None).unwrap_err();
        // No span of its own: falls back to the function's location.
        assert_eq!(err.location, sig.location);
    }
}
