use super::ValueType;
use crate::graph::PropertyType;

/// Returns whether a variable of type `source` may stay bound to a slot
/// declared as `target`.
pub fn is_compatible(source: ValueType, target: PropertyType) -> bool {
    if source == ValueType::Any {
        return true;
    }
    match target {
        PropertyType::Any | PropertyType::Blackboard | PropertyType::Variable => true,
        PropertyType::Number => source == ValueType::Number,
        PropertyType::Boolean => source == ValueType::Boolean,
        PropertyType::Object => source == ValueType::Object,
        PropertyType::Array => source == ValueType::Array,
        PropertyType::String => matches!(
            source,
            ValueType::String | ValueType::Number | ValueType::Boolean
        ),
        PropertyType::Select => source == ValueType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_type_is_compatible() {
        assert!(is_compatible(ValueType::Number, PropertyType::Number));
        assert!(is_compatible(ValueType::String, PropertyType::String));
        assert!(is_compatible(ValueType::Boolean, PropertyType::Boolean));
    }

    #[test]
    fn test_scalars_widen_to_string() {
        assert!(is_compatible(ValueType::Number, PropertyType::String));
        assert!(is_compatible(ValueType::Boolean, PropertyType::String));
        assert!(is_compatible(ValueType::String, PropertyType::Select));
        assert!(!is_compatible(ValueType::Number, PropertyType::Select));
    }

    #[test]
    fn test_changed_type_is_rejected_by_typed_slots() {
        assert!(!is_compatible(ValueType::String, PropertyType::Number));
        assert!(!is_compatible(ValueType::Object, PropertyType::Boolean));
        assert!(is_compatible(ValueType::Object, PropertyType::Any));
        assert!(is_compatible(ValueType::String, PropertyType::Variable));
    }
}
