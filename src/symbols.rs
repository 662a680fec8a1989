//! Symbol table built during pass one: variables (data directives) carry
//! an offset and a width, labels carry an offset only. Names share one
//! namespace and are case-sensitive.
use super::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    pub offset: u16,
    pub width: Width,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    vars: HashMap<String, Variable>,
    labels: HashMap<String, u16>,
}

impl SymbolTable {
    pub fn define_variable(&mut self, name: &str, offset: u16, width: Width, pos: Pos) -> Result<(), Error> {
        if self.vars.contains_key(name) || self.labels.contains_key(name) {
            return Err(asm_err!(
                crate::ErrorKind::DuplicateSymbol,
                pos,
                "symbol \"{}\" is already defined",
                name
            ));
        }
        self.vars.insert(name.to_string(), Variable { offset, width });
        Ok(())
    }
    pub fn define_label(&mut self, name: &str, offset: u16, pos: Pos) -> Result<(), Error> {
        if self.vars.contains_key(name) || self.labels.contains_key(name) {
            return Err(asm_err!(
                crate::ErrorKind::DuplicateSymbol,
                pos,
                "symbol \"{}\" is already defined",
                name
            ));
        }
        self.labels.insert(name.to_string(), offset);
        Ok(())
    }
    pub fn variable(&self, name: &str) -> Option<Variable> { self.vars.get(name).copied() }
    pub fn label(&self, name: &str) -> Option<u16> { self.labels.get(name).copied() }
    /// Offset of a variable or label, whichever the name denotes.
    pub fn resolve(&self, name: &str) -> Option<u16> {
        self.vars
            .get(name)
            .map(|v| v.offset)
            .or_else(|| self.labels.get(name).copied())
    }
    /// Everything that could fill an operand slot of the given width (or
    /// of any width), as typed completion hints: registers, variables of
    /// a matching width, and a placeholder constant.
    pub fn operand_suggestions(&self, width: Option<Width>) -> Vec<Suggestion> {
        let mut v = Vec::new();
        if width != Some(Width::Byte) {
            v.extend(registers::reg16_suggestions());
        }
        if width != Some(Width::Word) {
            v.extend(registers::reg8_suggestions());
        }
        let mut vars: Vec<Suggestion> = self
            .vars
            .iter()
            .filter(|(_, var)| width.map_or(true, |w| var.width == w))
            .map(|(name, var)| match var.width {
                Width::Byte => Suggestion::Variable8(name.clone()),
                Width::Word => Suggestion::Variable16(name.clone()),
            })
            .collect();
        vars.sort_by(|a, b| format!("{:?}", a).cmp(&format!("{:?}", b)));
        v.extend(vars);
        if width != Some(Width::Byte) {
            v.push(Suggestion::Constant16(0));
        }
        if width != Some(Width::Word) {
            v.push(Suggestion::Constant8(0));
        }
        v
    }
    /// Everything defined so far, as typed completion hints.
    pub fn suggestions(&self) -> Vec<Suggestion> {
        let mut v: Vec<Suggestion> = self
            .vars
            .iter()
            .map(|(name, var)| match var.width {
                Width::Byte => Suggestion::Variable8(name.clone()),
                Width::Word => Suggestion::Variable16(name.clone()),
            })
            .collect();
        v.extend(self.labels.keys().map(|name| Suggestion::Label(name.clone())));
        v.sort_by(|a, b| format!("{:?}", a).cmp(&format!("{:?}", b)));
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_and_labels_share_a_namespace() {
        let mut t = SymbolTable::default();
        let pos = Pos::new(1, 0, 3);
        t.define_variable("foo", 4, Width::Byte, pos).unwrap();
        t.define_label("bar", 9, pos).unwrap();
        assert_eq!(t.resolve("foo"), Some(4));
        assert_eq!(t.resolve("bar"), Some(9));
        assert_eq!(t.variable("foo").map(|v| v.width), Some(Width::Byte));
        assert!(t.variable("bar").is_none());
        let e = t.define_label("foo", 10, pos).unwrap_err();
        assert_eq!(e.kind, ErrorKind::DuplicateSymbol);
        let e = t.define_variable("bar", 2, Width::Word, pos).unwrap_err();
        assert_eq!(e.kind, ErrorKind::DuplicateSymbol);
    }

    #[test]
    fn operand_suggestions_filter_by_width() {
        let mut t = SymbolTable::default();
        let pos = Pos::new(1, 0, 5);
        t.define_variable("count", 0, Width::Byte, pos).unwrap();
        t.define_variable("total", 1, Width::Word, pos).unwrap();
        let v = t.operand_suggestions(Some(Width::Byte));
        assert!(v.contains(&Suggestion::Register8("AL")));
        assert!(v.contains(&Suggestion::Variable8("count".to_string())));
        assert!(v.contains(&Suggestion::Constant8(0)));
        assert!(!v.contains(&Suggestion::Register16("AX")));
        assert!(!v.contains(&Suggestion::Variable16("total".to_string())));
        assert!(!v.contains(&Suggestion::Constant16(0)));
        let v = t.operand_suggestions(None);
        assert!(v.contains(&Suggestion::Register16("DI")));
        assert!(v.contains(&Suggestion::Register8("BH")));
        assert!(v.contains(&Suggestion::Variable16("total".to_string())));
        assert!(v.contains(&Suggestion::Constant16(0)));
        assert!(v.contains(&Suggestion::Constant8(0)));
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut t = SymbolTable::default();
        let pos = Pos::new(1, 0, 3);
        t.define_label("Top", 0, pos).unwrap();
        assert_eq!(t.resolve("top"), None);
    }
}
