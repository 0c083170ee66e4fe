//! Translation units.
//!
//! Besides functions and globals, a module owns the three registration lists the
//! instrumentation relies on:
//!
//! - `global_ctors` / `global_dtors`: routines the loader runs before `main` and at exit,
//!   ordered by priority,
//! - `compiler_used`: symbols the optimizer must keep even when nothing references them.
//!
//! It also records which instrumentation passes have already been applied, so re-running
//! the pipeline over its own output does not instrument twice.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use crate::{
    ir::{Constant, Function, FunctionType, Linkage, Metadata, Type, Value},
    Error, Result,
};

/// A global variable.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    /// Symbol name.
    pub name: String,
    /// Value type.
    pub ty: Type,
    /// Whether the contents are immutable.
    pub is_constant: bool,
    /// Symbol visibility.
    pub linkage: Linkage,
    /// Initial value. `None` for external declarations.
    pub initializer: Option<Constant>,
    /// Required alignment in bytes.
    pub alignment: Option<u32>,
    /// Attached metadata.
    pub metadata: Vec<(String, Metadata)>,
}

impl GlobalVariable {
    /// Creates an internal, mutable global with the given initializer.
    #[must_use]
    pub fn new(name: impl Into<String>, initializer: Constant) -> Self {
        Self {
            name: name.into(),
            ty: initializer.ty(),
            is_constant: false,
            linkage: Linkage::Internal,
            initializer: Some(initializer),
            alignment: None,
            metadata: Vec::new(),
        }
    }

    /// Marks the global as immutable.
    #[must_use]
    pub fn constant(mut self) -> Self {
        self.is_constant = true;
        self
    }

    /// Sets the linkage.
    #[must_use]
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Sets the alignment.
    #[must_use]
    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = Some(alignment);
        self
    }

    /// Returns attached metadata by key.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&Metadata> {
        self.metadata
            .iter()
            .find_map(|(k, v)| if k == key { Some(v) } else { None })
    }

    /// Attaches metadata, replacing an existing node with the same key.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Metadata) {
        let key = key.into();
        if let Some(slot) = self.metadata.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.metadata.push((key, value));
        }
    }
}

impl fmt::Display for GlobalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_constant {
            "constant"
        } else {
            "global"
        };
        write!(f, "@{} = {} {} {}", self.name, self.linkage, kind, self.ty)?;
        if let Some(init) = &self.initializer {
            write!(f, " {init}")?;
        }
        if let Some(align) = self.alignment {
            write!(f, ", align {align}")?;
        }
        for (key, value) in &self.metadata {
            write!(f, " !{key} {value:?}")?;
        }
        Ok(())
    }
}

/// An entry in the constructor or destructor list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructorEntry {
    /// Lower runs earlier.
    pub priority: u32,
    /// The registered function.
    pub function: String,
}

/// A translation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    name: String,
    functions: Vec<Function>,
    globals: Vec<GlobalVariable>,
    global_ctors: Vec<StructorEntry>,
    global_dtors: Vec<StructorEntry>,
    compiler_used: Vec<String>,
    string_pool: HashMap<String, String>,
    applied: BTreeSet<String>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all functions in definition order.
    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Returns all functions mutably.
    pub fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions
    }

    /// Returns a function by name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Returns a function by name, mutably.
    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name() == name)
    }

    /// Returns true if a function or global with this name exists.
    #[must_use]
    pub fn has_symbol(&self, name: &str) -> bool {
        self.function(name).is_some() || self.global(name).is_some()
    }

    /// Adds a function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSymbol`] if the name is already taken.
    pub fn add_function(&mut self, function: Function) -> Result<&mut Function> {
        if self.has_symbol(function.name()) {
            return Err(Error::DuplicateSymbol(function.name().to_string()));
        }
        let index = self.functions.len();
        self.functions.push(function);
        Ok(&mut self.functions[index])
    }

    /// Returns the named function, declaring it with `ty` if it does not exist yet.
    pub fn get_or_insert_function(&mut self, name: &str, ty: FunctionType) -> &mut Function {
        let index = match self.functions.iter().position(|f| f.name() == name) {
            Some(index) => index,
            None => {
                self.functions.push(Function::new(name, ty));
                self.functions.len() - 1
            }
        };
        &mut self.functions[index]
    }

    /// Returns all globals.
    #[must_use]
    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    /// Returns a global by name.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Returns a global by name, mutably.
    pub fn global_mut(&mut self, name: &str) -> Option<&mut GlobalVariable> {
        self.globals.iter_mut().find(|g| g.name == name)
    }

    /// Adds a global variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSymbol`] if the name is already taken.
    pub fn add_global(&mut self, global: GlobalVariable) -> Result<()> {
        if self.has_symbol(&global.name) {
            return Err(Error::DuplicateSymbol(global.name));
        }
        self.globals.push(global);
        Ok(())
    }

    /// Removes a global and returns it.
    pub fn remove_global(&mut self, name: &str) -> Option<GlobalVariable> {
        let index = self.globals.iter().position(|g| g.name == name)?;
        self.string_pool.retain(|_, symbol| symbol.as_str() != name);
        Some(self.globals.remove(index))
    }

    /// Returns a reference to a private constant string global holding `value`.
    ///
    /// Identical strings share one global.
    pub fn create_global_string(&mut self, value: &str) -> Value {
        if let Some(symbol) = self.string_pool.get(value) {
            return Value::Global(symbol.clone());
        }

        let mut index = self.string_pool.len();
        let symbol = loop {
            let candidate = if index == 0 {
                ".str".to_string()
            } else {
                format!(".str.{index}")
            };
            if !self.has_symbol(&candidate) {
                break candidate;
            }
            index += 1;
        };

        self.globals.push(
            GlobalVariable::new(symbol.clone(), Constant::Str(value.to_string()))
                .constant()
                .with_linkage(Linkage::Private)
                .with_alignment(1),
        );
        self.string_pool.insert(value.to_string(), symbol.clone());
        Value::Global(symbol)
    }

    /// Returns the constructor list.
    #[must_use]
    pub fn global_ctors(&self) -> &[StructorEntry] {
        &self.global_ctors
    }

    /// Returns the destructor list.
    #[must_use]
    pub fn global_dtors(&self) -> &[StructorEntry] {
        &self.global_dtors
    }

    /// Registers a function to run before user code.
    pub fn append_to_global_ctors(&mut self, function: impl Into<String>, priority: u32) {
        self.global_ctors.push(StructorEntry {
            priority,
            function: function.into(),
        });
    }

    /// Registers a function to run at program exit.
    pub fn append_to_global_dtors(&mut self, function: impl Into<String>, priority: u32) {
        self.global_dtors.push(StructorEntry {
            priority,
            function: function.into(),
        });
    }

    /// Returns the keep-alive list.
    #[must_use]
    pub fn compiler_used(&self) -> &[String] {
        &self.compiler_used
    }

    /// Adds a symbol to the keep-alive list. Duplicates are ignored.
    pub fn append_to_compiler_used(&mut self, symbol: impl Into<String>) {
        let symbol = symbol.into();
        if !self.compiler_used.contains(&symbol) {
            self.compiler_used.push(symbol);
        }
    }

    /// Returns true if the symbol is on the keep-alive list.
    #[must_use]
    pub fn is_compiler_used(&self, symbol: &str) -> bool {
        self.compiler_used.iter().any(|s| s == symbol)
    }

    /// Returns true if the named instrumentation pass already ran on this module.
    #[must_use]
    pub fn has_applied(&self, pass: &str) -> bool {
        self.applied.contains(pass)
    }

    /// Records that an instrumentation pass ran on this module.
    pub fn mark_applied(&mut self, pass: impl Into<String>) {
        self.applied.insert(pass.into());
    }

    /// Returns the names of applied instrumentation passes in sorted order.
    pub fn applied_passes(&self) -> impl Iterator<Item = &str> {
        self.applied.iter().map(String::as_str)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for global in &self.globals {
            writeln!(f, "{global}")?;
        }
        for (list, entries) in [
            ("llvm.global_ctors", &self.global_ctors),
            ("llvm.global_dtors", &self.global_dtors),
        ] {
            if entries.is_empty() {
                continue;
            }
            write!(f, "@{list} = [")?;
            for (i, entry) in entries.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{{ {}, @{} }}", entry.priority, entry.function)?;
            }
            writeln!(f, "]")?;
        }
        if !self.compiler_used.is_empty() {
            writeln!(f, "@llvm.compiler.used = [@{}]", self.compiler_used.join(", @"))?;
        }
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_symbols() {
        let mut module = Module::new("m");
        module
            .add_function(Function::new("f", FunctionType::void()))
            .unwrap();
        assert!(matches!(
            module.add_function(Function::new("f", FunctionType::void())),
            Err(Error::DuplicateSymbol(name)) if name == "f"
        ));
        assert!(matches!(
            module.add_global(GlobalVariable::new("f", Constant::int(Type::I8, 0))),
            Err(Error::DuplicateSymbol(_))
        ));
    }

    #[test]
    fn test_get_or_insert_function() {
        let mut module = Module::new("m");
        module.get_or_insert_function("ext", FunctionType::void());
        module.get_or_insert_function("ext", FunctionType::new(Type::I64, vec![]));
        assert_eq!(module.functions().len(), 1);
        // The first signature wins
        assert_eq!(module.function("ext").unwrap().ty(), &FunctionType::void());
    }

    #[test]
    fn test_global_strings_are_pooled() {
        let mut module = Module::new("m");
        let a = module.create_global_string("src/lib.rs");
        let b = module.create_global_string("src/main.rs");
        let c = module.create_global_string("src/lib.rs");

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(a.as_global(), Some(".str"));
        assert_eq!(b.as_global(), Some(".str.1"));

        let global = module.global(".str").unwrap();
        assert!(global.is_constant);
        assert_eq!(global.linkage, Linkage::Private);
        assert_eq!(global.initializer, Some(Constant::Str("src/lib.rs".into())));
    }

    #[test]
    fn test_global_string_avoids_taken_names() {
        let mut module = Module::new("m");
        module
            .add_global(GlobalVariable::new(".str", Constant::int(Type::I8, 0)))
            .unwrap();
        let value = module.create_global_string("a.rs");
        assert_eq!(value.as_global(), Some(".str.1"));
    }

    #[test]
    fn test_compiler_used_dedup() {
        let mut module = Module::new("m");
        module.append_to_compiler_used("anchor");
        module.append_to_compiler_used("anchor");
        assert_eq!(module.compiler_used().len(), 1);
        assert!(module.is_compiler_used("anchor"));
    }

    #[test]
    fn test_applied_passes() {
        let mut module = Module::new("m");
        assert!(!module.has_applied("region-marker"));
        module.mark_applied("region-marker");
        assert!(module.has_applied("region-marker"));
        assert_eq!(module.applied_passes().collect::<Vec<_>>(), vec!["region-marker"]);
    }
}
