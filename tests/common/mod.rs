//! Hand-assembled class files for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_ANNOTATION: u16 = 0x2000;

/// Class-file text encoding: supplementary characters become two
/// three-byte surrogates, NUL becomes `C0 80`.
pub fn java_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for c in s.chars() {
        if c == '\0' {
            out.extend_from_slice(&[0xC0, 0x80]);
        } else if (c as u32) < 0x10000 {
            let mut buf = [0; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        } else {
            let mut units = [0; 2];
            for &u in c.encode_utf16(&mut units).iter() {
                out.extend_from_slice(&[0xE0 | (u >> 12) as u8, 0x80 | ((u >> 6) & 0x3F) as u8, 0x80 | (u & 0x3F) as u8]);
            }
        }
    }
    out
}

pub struct CpBuilder {
    entries: Vec<Vec<u8>>,
    utf8_cache: HashMap<String, u16>,
}

impl CpBuilder {
    pub fn new() -> Self {
        Self { entries: Vec::new(), utf8_cache: HashMap::new() }
    }

    fn push(&mut self, entry: Vec<u8>) -> u16 {
        self.entries.push(entry);
        self.entries.len() as u16
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        if let Some(&idx) = self.utf8_cache.get(s) {
            return idx;
        }
        let idx = self.raw_utf8(&java_utf8(s));
        self.utf8_cache.insert(s.to_string(), idx);
        idx
    }

    /// A Utf8 entry with arbitrary (e.g. modified UTF-8) bytes.
    pub fn raw_utf8(&mut self, bytes: &[u8]) -> u16 {
        let mut entry = vec![1];
        entry.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        entry.extend_from_slice(bytes);
        self.push(entry)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        let mut entry = vec![7];
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.push(entry)
    }

    pub fn string(&mut self, s: &str) -> u16 {
        let string_index = self.utf8(s);
        let mut entry = vec![8];
        entry.extend_from_slice(&string_index.to_be_bytes());
        self.push(entry)
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut entry = vec![12];
        entry.extend_from_slice(&name_index.to_be_bytes());
        entry.extend_from_slice(&descriptor_index.to_be_bytes());
        self.push(entry)
    }

    pub fn methodref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        let mut entry = vec![10];
        entry.extend_from_slice(&class_index.to_be_bytes());
        entry.extend_from_slice(&nat.to_be_bytes());
        self.push(entry)
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&value.to_be_bytes());
        self.push(entry)
    }

    /// Takes two slots.
    pub fn long(&mut self, value: i64) -> u16 {
        let mut entry = vec![5];
        entry.extend_from_slice(&value.to_be_bytes());
        let idx = self.push(entry);
        self.entries.push(Vec::new());
        idx
    }

    pub fn count(&self) -> u16 {
        self.entries.len() as u16 + 1
    }

    fn write(&self, out: &mut Vec<u8>) {
        u2(out, self.count());
        for e in &self.entries {
            out.extend_from_slice(e);
        }
    }
}

pub fn u1(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub fn u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn u4(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn push_attr(out: &mut Vec<u8>, name_index: u16, info: &[u8]) {
    u2(out, name_index);
    u4(out, info.len() as u32);
    out.extend_from_slice(info);
}

pub struct CodeSpec {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    /// `(start_pc, end_pc, handler_pc, catch_type)`
    pub exceptions: Vec<(u16, u16, u16, u16)>,
    /// `(name, body)`
    pub attributes: Vec<(&'static str, Vec<u8>)>,
}

impl CodeSpec {
    pub fn simple(code: Vec<u8>) -> Self {
        Self { max_stack: 2, max_locals: 4, code, exceptions: Vec::new(), attributes: Vec::new() }
    }
}

pub struct MethodSpec {
    pub access: u16,
    pub name: &'static str,
    pub descriptor: &'static str,
    pub code: Option<CodeSpec>,
}

impl MethodSpec {
    pub fn new(access: u16, name: &'static str, descriptor: &'static str, code: Vec<u8>) -> Self {
        Self { access, name, descriptor, code: Some(CodeSpec::simple(code)) }
    }

    pub fn bodiless(access: u16, name: &'static str, descriptor: &'static str) -> Self {
        Self { access, name, descriptor, code: None }
    }
}

/// Assembles a version 52 class named `this_class` extending
/// `java/lang/Object`, with a `SourceFile` attribute.
pub fn build_class(access: u16, this_class: &str, methods: &[MethodSpec]) -> Vec<u8> {
    build_class_with(access, this_class, methods, |_| {})
}

/// Like [`build_class`]; `extra` may add constants before methods are laid out.
pub fn build_class_with(
    access: u16,
    this_class: &str,
    methods: &[MethodSpec],
    extra: impl FnOnce(&mut CpBuilder),
) -> Vec<u8> {
    let mut cp = CpBuilder::new();
    let this_index = cp.class(this_class);
    let super_index = cp.class("java/lang/Object");
    extra(&mut cp);
    let code_name = cp.utf8("Code");
    let source_file = cp.utf8("SourceFile");
    let source_name = cp.utf8("Test.java");

    let mut method_bytes = Vec::new();
    for m in methods {
        let name = cp.utf8(m.name);
        let desc = cp.utf8(m.descriptor);
        u2(&mut method_bytes, m.access);
        u2(&mut method_bytes, name);
        u2(&mut method_bytes, desc);
        match &m.code {
            None => u2(&mut method_bytes, 0),
            Some(code) => {
                u2(&mut method_bytes, 1);
                let mut body = Vec::new();
                u2(&mut body, code.max_stack);
                u2(&mut body, code.max_locals);
                u4(&mut body, code.code.len() as u32);
                body.extend_from_slice(&code.code);
                u2(&mut body, code.exceptions.len() as u16);
                for &(s, e, h, c) in &code.exceptions {
                    u2(&mut body, s);
                    u2(&mut body, e);
                    u2(&mut body, h);
                    u2(&mut body, c);
                }
                u2(&mut body, code.attributes.len() as u16);
                for (attr_name, attr_body) in &code.attributes {
                    let idx = cp.utf8(attr_name);
                    push_attr(&mut body, idx, attr_body);
                }
                push_attr(&mut method_bytes, code_name, &body);
            }
        }
    }

    let mut out = Vec::new();
    u4(&mut out, 0xCAFEBABE);
    u2(&mut out, 0);
    u2(&mut out, 52);
    cp.write(&mut out);
    u2(&mut out, access);
    u2(&mut out, this_index);
    u2(&mut out, super_index);
    u2(&mut out, 0); // interfaces
    u2(&mut out, 0); // fields
    u2(&mut out, methods.len() as u16);
    out.extend_from_slice(&method_bytes);
    u2(&mut out, 1);
    push_attr(&mut out, source_file, &source_name.to_be_bytes());
    out
}
