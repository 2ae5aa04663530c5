//! Property access
//!
//! Lookups walk the prototype chain and invoke accessors. Arrays keep their
//! `length` as an ordinary data property that stores and truncations
//! maintain.

use std::collections::HashSet;
use std::rc::Rc;

use core_types::{JsError, Value};
use memory_manager::{Property, PropertyFlags};

use crate::error::VmResult;
use crate::object::ObjectClass;
use crate::operations::canonical_index;
use crate::vm::VmContext;

/// Which half of an accessor pair `SET_GETTER`/`SET_SETTER` installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    /// `get name() {}`
    Getter,
    /// `set name(v) {}`
    Setter,
}

fn nullish_name(base: Value) -> &'static str {
    if base.is_null() {
        "null"
    } else {
        "undefined"
    }
}

impl VmContext {
    /// `base[key]` for any base value.
    ///
    /// # Errors
    ///
    /// A thrown `TypeError` when `base` is `undefined` or `null`.
    pub fn get_value(&mut self, base: Value, key: Value) -> VmResult<Value> {
        let name = self.to_property_key(key)?;
        if base.is_nullish() {
            let message = format!("Cannot read property '{name}' of {}", nullish_name(base));
            return Err(self.throw_error(JsError::type_error(message)));
        }
        if base.is_object() {
            return self.get(base, &name, base);
        }
        let proto = if base.is_string() {
            let text = self.to_js_string(base)?;
            if &*name == "length" {
                return self.new_number(text.encode_utf16().count() as f64);
            }
            if let Some(index) = canonical_index(&name) {
                if let Some(unit) = text.encode_utf16().nth(index as usize) {
                    return self.new_string(&String::from_utf16_lossy(&[unit]));
                }
            }
            self.intrinsics.string_prototype
        } else if base.is_number() {
            self.intrinsics.number_prototype
        } else if base.is_boolean() {
            self.intrinsics.boolean_prototype
        } else {
            return Ok(Value::UNDEFINED);
        };
        self.get(proto, &name, base)
    }

    /// Property `name` of `object` or its prototypes. Getters run with
    /// `receiver` as `this`.
    pub fn get(&mut self, object: Value, name: &str, receiver: Value) -> VmResult<Value> {
        let mut current = object;
        while current.is_object() {
            match self.heap.own_property(current, name)? {
                Some(Property::Data { value, .. }) => return Ok(value),
                Some(Property::Accessor { getter, .. }) => {
                    if self.is_callable(getter) {
                        return self.call(getter, receiver, &[]);
                    }
                    return Ok(Value::UNDEFINED);
                }
                None => current = self.heap.proto(current)?,
            }
        }
        Ok(Value::UNDEFINED)
    }

    /// `base[key] = value`.
    ///
    /// When both `key` and `value` are objects the key object's own
    /// enumerable properties are copied into `base` instead; the compiler
    /// emits this form for object spread.
    ///
    /// # Errors
    ///
    /// A thrown `TypeError` when `base` is `undefined` or `null`.
    pub fn put_value(&mut self, base: Value, key: Value, value: Value) -> VmResult<()> {
        if base.is_nullish() {
            let name = self.to_property_key(key)?;
            let message = format!("Cannot set property '{name}' of {}", nullish_name(base));
            return Err(self.throw_error(JsError::type_error(message)));
        }
        if !base.is_object() {
            return Ok(());
        }
        if key.is_object() && value.is_object() {
            return self.copy_own_enumerable(key, base);
        }
        let name = self.to_property_key(key)?;
        self.set(base, &name, value)
    }

    fn copy_own_enumerable(&mut self, source: Value, target: Value) -> VmResult<()> {
        for (name, enumerable) in self.heap.own_names(source)? {
            if enumerable {
                let value = self.get(source, name.as_str(), source)?;
                self.set(target, name.as_str(), value)?;
            }
        }
        Ok(())
    }

    /// Assigns property `name`, running inherited setters and respecting
    /// non-writable properties.
    pub fn set(&mut self, object: Value, name: &str, value: Value) -> VmResult<()> {
        let is_array = matches!(self.heap.object(object)?.class, ObjectClass::Array);
        if is_array && name == "length" {
            return self.set_array_length(object, value);
        }

        let mut current = object;
        while current.is_object() {
            match self.heap.own_property(current, name)? {
                Some(Property::Data { flags, .. }) => {
                    if !flags.contains(PropertyFlags::WRITABLE) {
                        return Ok(());
                    }
                    if current == object {
                        return self
                            .heap
                            .define_own(object, name, Property::Data { value, flags });
                    }
                    break;
                }
                Some(Property::Accessor { setter, .. }) => {
                    if self.is_callable(setter) {
                        self.call(setter, object, &[value])?;
                    }
                    return Ok(());
                }
                None => current = self.heap.proto(current)?,
            }
        }

        self.heap.define_own(object, name, Property::data(value))?;
        if is_array {
            if let Some(index) = canonical_index(name) {
                if index >= self.array_length(object)? {
                    self.store_length(object, index + 1)?;
                }
            }
        }
        Ok(())
    }

    /// Current `length` of an array.
    pub fn array_length(&self, array: Value) -> VmResult<u32> {
        Ok(match self.heap.own_property(array, "length")? {
            Some(Property::Data { value, .. }) => {
                self.number_value(value).map_or(0, |n| n as u32)
            }
            _ => 0,
        })
    }

    pub(crate) fn store_length(&mut self, array: Value, length: u32) -> VmResult<()> {
        let value = self.new_number(f64::from(length))?;
        self.heap.define_own(
            array,
            "length",
            Property::Data {
                value,
                flags: PropertyFlags::WRITABLE,
            },
        )
    }

    fn set_array_length(&mut self, array: Value, value: Value) -> VmResult<()> {
        let number = self.to_number(value)?;
        let length = number as u32;
        if f64::from(length) != number {
            return Err(self.throw_error(JsError::range_error("Invalid array length")));
        }
        if length < self.array_length(array)? {
            let removed: Vec<_> = self
                .heap
                .own_names(array)?
                .into_iter()
                .filter(|(name, _)| canonical_index(name.as_str()).map_or(false, |i| i >= length))
                .collect();
            for (name, _) in removed {
                self.heap.remove_own(array, name.as_str())?;
            }
        }
        self.store_length(array, length)
    }

    /// Removes own property `name`. Returns `false` when the property is not
    /// configurable.
    pub fn delete_property(&mut self, object: Value, name: &str) -> VmResult<bool> {
        match self.heap.own_property(object, name)? {
            None => Ok(true),
            Some(property) if !property.flags().contains(PropertyFlags::CONFIGURABLE) => Ok(false),
            Some(_) => {
                self.heap.remove_own(object, name)?;
                Ok(true)
            }
        }
    }

    /// Whether `object` or a prototype has property `name`.
    pub fn has_property(&self, object: Value, name: &str) -> VmResult<bool> {
        let mut current = object;
        while current.is_object() {
            if self.heap.own_property(current, name)?.is_some() {
                return Ok(true);
            }
            current = self.heap.proto(current)?;
        }
        Ok(false)
    }

    /// Names `for-in` visits: enumerable properties of the object and its
    /// prototypes, array indices first in ascending order, then insertion
    /// order. A name is listed once, at the nearest object defining it.
    pub fn enumerable_names(&self, object: Value) -> VmResult<Vec<Rc<str>>> {
        let mut seen: HashSet<Rc<str>> = HashSet::new();
        let mut names = Vec::new();
        let mut current = object;
        while current.is_object() {
            let own = self.heap.own_names(current)?;
            let mut indices: Vec<_> = own
                .iter()
                .filter_map(|(name, enumerable)| {
                    canonical_index(name.as_str()).map(|index| (index, name, *enumerable))
                })
                .collect();
            indices.sort_by_key(|(index, _, _)| *index);
            let others = own
                .iter()
                .filter(|(name, _)| canonical_index(name.as_str()).is_none())
                .map(|(name, enumerable)| (name, *enumerable));

            for (name, enumerable) in indices
                .into_iter()
                .map(|(_, name, enumerable)| (name, enumerable))
                .chain(others)
            {
                let name: Rc<str> = Rc::from(name.as_str());
                if seen.insert(Rc::clone(&name)) && enumerable {
                    names.push(name);
                }
            }
            current = self.heap.proto(current)?;
        }
        Ok(names)
    }

    /// Names `for-in` visits on a primitive, as on its wrapper object: the
    /// indices of a string, then the enumerable names of the wrapper's
    /// prototype chain. `undefined` and `null` have none.
    pub fn primitive_enumerable_names(&mut self, value: Value) -> VmResult<Vec<Rc<str>>> {
        let (mut names, proto) = if value.is_string() {
            let length = self.to_js_string(value)?.encode_utf16().count();
            let indices: Vec<Rc<str>> = (0..length)
                .map(|index| Rc::from(index.to_string()))
                .collect();
            (indices, self.intrinsics.string_prototype)
        } else if value.is_number() {
            (Vec::new(), self.intrinsics.number_prototype)
        } else if value.is_boolean() {
            (Vec::new(), self.intrinsics.boolean_prototype)
        } else {
            return Ok(Vec::new());
        };
        for name in self.enumerable_names(proto)? {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Element values of an array-like object, `length` of them.
    pub fn array_elements(&mut self, object: Value) -> VmResult<Vec<Value>> {
        let length = self.get(object, "length", object)?;
        let length = self.to_uint32(length)?;
        let mut elements = Vec::with_capacity(length as usize);
        for index in 0..length {
            elements.push(self.get(object, &index.to_string(), object)?);
        }
        Ok(elements)
    }

    /// Installs one half of an accessor property, keeping the other half.
    pub fn set_accessor(
        &mut self,
        object: Value,
        name: &str,
        function: Value,
        kind: AccessorKind,
    ) -> VmResult<()> {
        let (mut getter, mut setter) = match self.heap.own_property(object, name)? {
            Some(Property::Accessor { getter, setter, .. }) => (getter, setter),
            _ => (Value::UNDEFINED, Value::UNDEFINED),
        };
        match kind {
            AccessorKind::Getter => getter = function,
            AccessorKind::Setter => setter = function,
        }
        self.heap.define_own(
            object,
            name,
            Property::Accessor {
                getter,
                setter,
                flags: PropertyFlags::ENUMERABLE | PropertyFlags::CONFIGURABLE,
            },
        )
    }
}
