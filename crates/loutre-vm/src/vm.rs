//! vm.rs — La machine virtuelle Loutre.
//!
//! Une pile de valeurs unique, des frames d'appel à fenêtre de slots, la
//! liste des upvalues ouverts, les globales, et le pilotage du collecteur.
//! La boucle `run` lit un opcode à la fois et applique sa sémantique ;
//! toute opération faillible remonte une [`RuntimeError`] que `interpret`
//! transforme en message + trace de pile avant de remettre la VM au propre.
//!
//! Discipline GC : le tas ne collecte jamais seul. Chaque point
//! d'allocation de la VM (`alloc_obj`, `intern`, `intern_owned`) marque
//! d'abord les racines et collecte *avant* d'allouer — un objet tout neuf
//! ne peut donc pas être balayé pendant qu'on l'assemble, tant qu'il est
//! rangé dans un emplacement enraciné avant l'allocation suivante.

use std::fmt::Write as _;

use loutre_core::{
    disasm, print_value, Chunk, Heap, Location, NativeFn, Obj, ObjBoundMethod, ObjClass,
    ObjClosure, ObjInstance, ObjNative, ObjRef, ObjUpvalue, Op, Table, Value,
};
use loutre_compiler::compile;

use crate::error::{InterpretError, RuntimeError};
use crate::host::{DefaultHost, Host};
use crate::natives;

/// Profondeur d'appels maximale.
pub const FRAMES_MAX: usize = 64;

/// Capacité de la pile de valeurs : 256 slots par frame possible, si bien
/// que l'épuisement des frames précède toujours celui de la pile.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// Options de construction de la VM.
#[derive(Debug, Clone, Default)]
pub struct VmOptions {
    /// Trace chaque instruction (pile + désassemblage) sur stderr.
    pub trace: bool,
    /// Collecte à chaque allocation (débusque les erreurs d'enracinement).
    pub stress_gc: bool,
}

impl VmOptions {
    /// Active/désactive la trace d'exécution.
    pub fn with_trace(mut self, on: bool) -> Self { self.trace = on; self }
    /// Active/désactive le mode stress du GC.
    pub fn with_stress_gc(mut self, on: bool) -> Self { self.stress_gc = on; self }
}

/// Frame d'appel : fermeture exécutée, pointeur d'instruction, base de la
/// fenêtre de slots (le slot 0 est le callee, ou le receveur des méthodes).
#[derive(Debug, Clone, Copy)]
struct CallFrame {
    closure: ObjRef,
    ip: usize,
    slots: usize,
}

/// Machine virtuelle.
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    /// Upvalues ouverts, triés par slot de pile décroissant ; au plus un
    /// par slot.
    open_upvalues: Vec<ObjRef>,
    heap: Heap,
    /// "init", interné une fois pour la recherche du constructeur.
    init_string: ObjRef,
    options: VmOptions,
    host: Box<dyn Host>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// VM avec options par défaut.
    pub fn new() -> Self {
        Self::with_options(VmOptions::default())
    }

    /// VM avec les options fournies ; `clock` est déjà dans les globales.
    pub fn with_options(options: VmOptions) -> Self {
        let mut heap = Heap::new();
        let init_string = heap.intern("init");
        let mut vm = Self {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            heap,
            init_string,
            options,
            host: Box::new(DefaultHost),
        };
        natives::anchor_clock();
        vm.define_native("clock", natives::clock);
        vm
    }

    /// Installe un hôte personnalisé (tests : hôte de capture).
    #[must_use]
    pub fn with_host(mut self, host: Box<dyn Host>) -> Self {
        self.host = host;
        self
    }

    /// Lecture seule du tas (désassemblage, tests).
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Déclare une fonction native dans les globales.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        // nom puis objet passent par la pile : enracinés pendant les deux
        // allocations
        let name_ref = self.intern(name);
        self.stack.push(Value::Obj(name_ref));
        let native = self.alloc_obj(Obj::Native(ObjNative { function }));
        self.stack.push(Value::Obj(native));
        let hash = self.heap.str_hash(name_ref);
        self.globals.set(name_ref, hash, Value::Obj(native));
        self.stack.pop();
        self.stack.pop();
    }

    // ---------- Entrée principale ----------

    /// Compile puis exécute `source`. Les diagnostics partent vers l'hôte ;
    /// la VM ressort propre, prête pour un `interpret` suivant.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = match compile(source, &mut self.heap) {
            Ok(f) => f,
            Err(err) => {
                for line in &err.messages {
                    self.host.eprint(line);
                }
                return Err(InterpretError::Compile);
            }
        };

        // la fonction passe par la pile le temps d'allouer sa fermeture
        self.stack.push(Value::Obj(function));
        let closure = self.alloc_obj(Obj::Closure(ObjClosure { function, upvalues: Vec::new() }));
        self.stack.pop();
        self.stack.push(Value::Obj(closure));

        let result = self.call(closure, 0).and_then(|()| self.run());
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.report_runtime_error(&err);
                self.reset();
                Err(InterpretError::Runtime)
            }
        }
    }

    /// Compile `source` et rend le désassemblage du script et de toutes
    /// ses fonctions imbriquées, sans exécuter.
    pub fn disassemble(&mut self, source: &str) -> Result<String, InterpretError> {
        match compile(source, &mut self.heap) {
            Ok(f) => Ok(disasm::disassemble_function(&self.heap, f)),
            Err(err) => {
                for line in &err.messages {
                    self.host.eprint(line);
                }
                Err(InterpretError::Compile)
            }
        }
    }

    fn report_runtime_error(&mut self, error: &RuntimeError) {
        let mut lines = vec![error.to_string()];
        // une ligne par frame, de la plus interne vers l'externe ; l'ip a
        // déjà dépassé l'octet fautif, d'où le -1
        for frame in self.frames.iter().rev() {
            let closure = self.heap.closure(frame.closure);
            let fun = self.heap.function(closure.function);
            let line = fun.chunk.line_for(frame.ip.saturating_sub(1));
            let location = match fun.name {
                Some(n) => format!("{}()", self.heap.string(n).chars),
                None => "script".to_string(),
            };
            lines.push(format!("[line {line}] in {location}"));
        }
        for line in lines {
            self.host.eprint(&line);
        }
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    // ---------- Boucle de dispatch ----------

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            if self.options.trace {
                self.trace_instruction();
            }
            let op = Op::try_from(self.read_byte())?;
            match op {
                Op::Constant => {
                    let value = self.read_constant();
                    self.push(value)?;
                }
                Op::Nil => self.push(Value::Nil)?,
                Op::True => self.push(Value::Bool(true))?,
                Op::False => self.push(Value::Bool(false))?,
                Op::Pop => {
                    self.pop()?;
                }

                Op::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let value = self.stack[self.frame().slots + slot];
                    self.push(value)?;
                }
                Op::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots;
                    self.stack[base + slot] = self.peek(0);
                }

                Op::GetGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.str_hash(name);
                    let value = self.globals.get(name, hash);
                    match value {
                        Some(v) => self.push(v)?,
                        None => {
                            return Err(RuntimeError::UndefinedVariable(
                                self.heap.string(name).chars.clone(),
                            ));
                        }
                    }
                }
                Op::DefineGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.str_hash(name);
                    let value = self.peek(0);
                    self.globals.set(name, hash, value);
                    self.pop()?;
                }
                Op::SetGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.str_hash(name);
                    let value = self.peek(0);
                    if self.globals.set(name, hash, value) {
                        // l'affectation ne crée jamais : on retire la clé
                        // qu'on vient d'insérer avant de signaler
                        self.globals.delete(name, hash);
                        return Err(RuntimeError::UndefinedVariable(
                            self.heap.string(name).chars.clone(),
                        ));
                    }
                }

                Op::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[slot];
                    let value = match self.heap.upvalue(upvalue).location {
                        Location::Open(ix) => self.stack[ix],
                        Location::Closed(v) => v,
                    };
                    self.push(value)?;
                }
                Op::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[slot];
                    let value = self.peek(0);
                    match self.heap.upvalue(upvalue).location {
                        Location::Open(ix) => self.stack[ix] = value,
                        Location::Closed(_) => {
                            self.heap.upvalue_mut(upvalue).location = Location::Closed(value);
                        }
                    }
                }

                Op::GetProperty => {
                    let name = self.read_string();
                    let receiver = self.peek(0);
                    let instance_ref = match receiver {
                        Value::Obj(r) if matches!(self.heap.obj(r), Obj::Instance(_)) => r,
                        _ => return Err(RuntimeError::OnlyInstancesHaveProperties),
                    };
                    let hash = self.heap.str_hash(name);
                    // les champs masquent les méthodes
                    let field = self.heap.instance(instance_ref).fields.get(name, hash);
                    if let Some(value) = field {
                        self.pop()?;
                        self.push(value)?;
                    } else {
                        let class = self.heap.instance(instance_ref).class;
                        self.bind_method(class, name)?;
                    }
                }
                Op::SetProperty => {
                    let name = self.read_string();
                    let target = self.peek(1);
                    let instance_ref = match target {
                        Value::Obj(r) if matches!(self.heap.obj(r), Obj::Instance(_)) => r,
                        _ => return Err(RuntimeError::OnlyInstancesHaveFields),
                    };
                    let hash = self.heap.str_hash(name);
                    let value = self.peek(0);
                    self.heap.instance_mut(instance_ref).fields.set(name, hash, value);
                    // la valeur affectée reste sur la pile
                    let value = self.pop()?;
                    self.pop()?;
                    self.push(value)?;
                }
                Op::GetSuper => {
                    let name = self.read_string();
                    let Value::Obj(superclass) = self.pop()? else {
                        unreachable!("super slot holds a class");
                    };
                    self.bind_method(superclass, name)?;
                }

                Op::Equal => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a == b))?;
                }
                Op::Greater => self.binary_cmp(|a, b| a > b)?,
                Op::Less => self.binary_cmp(|a, b| a < b)?,
                Op::Add => self.add()?,
                Op::Subtract => self.binary_num(|a, b| a - b)?,
                Op::Multiply => self.binary_num(|a, b| a * b)?,
                Op::Divide => self.binary_num(|a, b| a / b)?,
                Op::Not => {
                    let value = self.pop()?;
                    self.push(Value::Bool(value.is_falsey()))?;
                }
                Op::Negate => match self.peek(0) {
                    Value::Number(n) => {
                        self.pop()?;
                        self.push(Value::Number(-n))?;
                    }
                    _ => return Err(RuntimeError::OperandMustBeNumber),
                },

                Op::Print => {
                    let value = self.pop()?;
                    let text = print_value(&self.heap, value);
                    self.host.print(&text);
                }

                Op::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip += offset;
                }
                Op::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    // peek : la condition reste sur la pile
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                Op::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip -= offset;
                }

                Op::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.peek(arg_count as usize);
                    self.call_value(callee, arg_count)?;
                }
                Op::Invoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte();
                    self.invoke(name, arg_count)?;
                }
                Op::SuperInvoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte();
                    let Value::Obj(superclass) = self.pop()? else {
                        unreachable!("super slot holds a class");
                    };
                    self.invoke_from_class(superclass, name, arg_count)?;
                }

                Op::Closure => {
                    let Value::Obj(function) = self.read_constant() else {
                        unreachable!("closure operand is a function constant");
                    };
                    let upvalue_count = self.heap.function(function).upvalue_count;
                    let closure = self.alloc_obj(Obj::Closure(ObjClosure {
                        function,
                        upvalues: Vec::with_capacity(upvalue_count),
                    }));
                    // poussée avant la capture : chaque upvalue fraîchement
                    // alloué est aussitôt rangé dans un objet enraciné
                    self.push(Value::Obj(closure))?;
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() == 1;
                        let index = self.read_byte() as usize;
                        let captured = if is_local {
                            let slot = self.frame().slots + index;
                            self.capture_upvalue(slot)
                        } else {
                            self.heap.closure(self.frame().closure).upvalues[index]
                        };
                        match self.heap.obj_mut(closure) {
                            Obj::Closure(c) => c.upvalues.push(captured),
                            _ => unreachable!("freshly allocated closure"),
                        }
                    }
                }
                Op::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop()?;
                }

                Op::Return => {
                    let result = self.pop()?;
                    let frame = self.frames.pop().ok_or(RuntimeError::StackUnderflow)?;
                    self.close_upvalues(frame.slots);
                    if self.frames.is_empty() {
                        // le script lui-même rend la main
                        self.pop()?;
                        return Ok(());
                    }
                    self.stack.truncate(frame.slots);
                    self.push(result)?;
                }

                Op::Class => {
                    let name = self.read_string();
                    let class =
                        self.alloc_obj(Obj::Class(ObjClass { name, methods: Table::new() }));
                    self.push(Value::Obj(class))?;
                }
                Op::Inherit => {
                    let superclass = self.peek(1);
                    let Value::Obj(sup) = superclass else {
                        return Err(RuntimeError::SuperclassMustBeClass);
                    };
                    let methods = match self.heap.obj(sup) {
                        Obj::Class(k) => k.methods.clone(),
                        _ => return Err(RuntimeError::SuperclassMustBeClass),
                    };
                    let Value::Obj(sub) = self.peek(0) else {
                        unreachable!("subclass on top of stack");
                    };
                    self.heap.class_mut(sub).methods.add_all(&methods);
                    // pop de la *sous-classe* : la superclasse reste sur la
                    // pile pour un GetSuper ultérieur
                    self.pop()?;
                }
                Op::Method => {
                    let name = self.read_string();
                    let method = self.peek(0);
                    let Value::Obj(class) = self.peek(1) else {
                        unreachable!("class under the method");
                    };
                    let hash = self.heap.str_hash(name);
                    self.heap.class_mut(class).methods.set(name, hash, method);
                    self.pop()?;
                }
            }
        }
    }

    // ---------- Lecture du flux d'instructions ----------

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("a call frame is active while running")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("a call frame is active while running")
    }

    fn chunk(&self) -> &Chunk {
        let closure = self.heap.closure(self.frame().closure);
        &self.heap.function(closure.function).chunk
    }

    fn read_byte(&mut self) -> u8 {
        let ip = self.frame().ip;
        let byte = self.chunk().code[ip];
        self.frame_mut().ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        (u16::from(hi) << 8) | u16::from(lo)
    }

    fn read_constant(&mut self) -> Value {
        let ix = self.read_byte() as usize;
        self.chunk().constants[ix]
    }

    fn read_string(&mut self) -> ObjRef {
        match self.read_constant() {
            Value::Obj(r) => r,
            other => unreachable!("name constant is a string, found {other:?}"),
        }
    }

    // ---------- Pile ----------

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    // ---------- Arithmétique ----------

    fn binary_num(&mut self, f: impl FnOnce(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let (Value::Number(b), Value::Number(a)) = (self.peek(0), self.peek(1)) else {
            return Err(RuntimeError::OperandsMustBeNumbers);
        };
        self.pop()?;
        self.pop()?;
        self.push(Value::Number(f(a, b)))
    }

    fn binary_cmp(&mut self, f: impl FnOnce(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let (Value::Number(b), Value::Number(a)) = (self.peek(0), self.peek(1)) else {
            return Err(RuntimeError::OperandsMustBeNumbers);
        };
        self.pop()?;
        self.pop()?;
        self.push(Value::Bool(f(a, b)))
    }

    /// `Add` surchargé : deux nombres s'additionnent, deux chaînes se
    /// concatènent (nouvelle chaîne internée), tout autre couple est une
    /// erreur.
    fn add(&mut self) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop()?;
                self.pop()?;
                self.push(Value::Number(a + b))
            }
            (Value::Obj(a), Value::Obj(b)) => {
                let (Obj::Str(sa), Obj::Str(sb)) = (self.heap.obj(a), self.heap.obj(b)) else {
                    return Err(RuntimeError::OperandsMustBeNumbersOrStrings);
                };
                let mut out = String::with_capacity(sa.chars.len() + sb.chars.len());
                out.push_str(&sa.chars);
                out.push_str(&sb.chars);
                // les opérandes restent empilés : enracinés pendant
                // l'allocation du résultat
                let result = self.intern_owned(out);
                self.pop()?;
                self.pop()?;
                self.push(Value::Obj(result))
            }
            _ => Err(RuntimeError::OperandsMustBeNumbersOrStrings),
        }
    }

    // ---------- Appels ----------

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), RuntimeError> {
        enum Callee {
            Closure,
            Native(NativeFn),
            Class,
            Bound(Value, ObjRef),
        }

        if let Value::Obj(r) = callee {
            // copie des données utiles : libère l'emprunt sur le tas
            let kind = match self.heap.obj(r) {
                Obj::Closure(_) => Some(Callee::Closure),
                Obj::Native(n) => Some(Callee::Native(n.function)),
                Obj::Class(_) => Some(Callee::Class),
                Obj::Bound(b) => Some(Callee::Bound(b.receiver, b.method)),
                _ => None,
            };
            match kind {
                Some(Callee::Closure) => return self.call(r, arg_count),
                Some(Callee::Native(function)) => {
                    let start = self.stack.len() - arg_count as usize;
                    let result = function(&self.stack[start..]);
                    // args + callee d'un coup, pas de frame pour une native
                    self.stack.truncate(start - 1);
                    return self.push(result);
                }
                Some(Callee::Class) => return self.call_class(r, arg_count),
                Some(Callee::Bound(receiver, method)) => {
                    // le receveur prend la place du callee : slot 0 du
                    // frame de la méthode
                    let slot = self.stack.len() - arg_count as usize - 1;
                    self.stack[slot] = receiver;
                    return self.call(method, arg_count);
                }
                None => {}
            }
        }
        Err(RuntimeError::NotCallable)
    }

    fn call(&mut self, closure: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let arity = self.heap.function(self.heap.closure(closure).function).arity;
        if arg_count != arity {
            return Err(RuntimeError::ArityMismatch { expected: arity, got: arg_count });
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slots: self.stack.len() - arg_count as usize - 1,
        });
        Ok(())
    }

    fn call_class(&mut self, class: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        // la classe appelée est encore dans le slot callee : enracinée
        // pendant l'allocation de l'instance
        let instance = self.alloc_obj(Obj::Instance(ObjInstance { class, fields: Table::new() }));
        let slot = self.stack.len() - arg_count as usize - 1;
        self.stack[slot] = Value::Obj(instance);

        let hash = self.heap.str_hash(self.init_string);
        let initializer = self.heap.class(class).methods.get(self.init_string, hash);
        match initializer {
            Some(Value::Obj(init)) => self.call(init, arg_count),
            Some(other) => unreachable!("initializer is a closure, found {other:?}"),
            None if arg_count != 0 => {
                Err(RuntimeError::ArityMismatch { expected: 0, got: arg_count })
            }
            None => Ok(()),
        }
    }

    fn invoke(&mut self, name: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let receiver = self.peek(arg_count as usize);
        let Value::Obj(r) = receiver else {
            return Err(RuntimeError::OnlyInstancesHaveProperties);
        };
        let hash = self.heap.str_hash(name);
        let (field, class) = match self.heap.obj(r) {
            Obj::Instance(instance) => (instance.fields.get(name, hash), instance.class),
            _ => return Err(RuntimeError::OnlyInstancesHaveProperties),
        };
        // un champ appelable masque la méthode du même nom
        if let Some(field) = field {
            let slot = self.stack.len() - arg_count as usize - 1;
            self.stack[slot] = field;
            return self.call_value(field, arg_count);
        }
        self.invoke_from_class(class, name, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let hash = self.heap.str_hash(name);
        let method = self.heap.class(class).methods.get(name, hash);
        match method {
            Some(Value::Obj(method)) => self.call(method, arg_count),
            Some(other) => unreachable!("method is a closure, found {other:?}"),
            None => Err(RuntimeError::UndefinedProperty(
                self.heap.string(name).chars.clone(),
            )),
        }
    }

    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), RuntimeError> {
        let hash = self.heap.str_hash(name);
        let method = self.heap.class(class).methods.get(name, hash);
        let Some(Value::Obj(method)) = method else {
            return Err(RuntimeError::UndefinedProperty(
                self.heap.string(name).chars.clone(),
            ));
        };
        // le receveur est encore empilé pendant l'allocation
        let receiver = self.peek(0);
        let bound = self.alloc_obj(Obj::Bound(ObjBoundMethod { receiver, method }));
        self.pop()?;
        self.push(Value::Obj(bound))
    }

    // ---------- Upvalues ----------

    /// Capture la locale au slot absolu `slot`. La liste ouverte est triée
    /// par slot décroissant : on réutilise l'upvalue existant du même slot
    /// (partage garanti), sinon on insère en position triée.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, &upvalue) in self.open_upvalues.iter().enumerate() {
            match self.heap.upvalue(upvalue).location {
                Location::Open(s) if s > slot => {}
                Location::Open(s) if s == slot => return upvalue,
                _ => {
                    insert_at = i;
                    break;
                }
            }
        }
        let created = self.alloc_obj(Obj::Upvalue(ObjUpvalue { location: Location::Open(slot) }));
        self.open_upvalues.insert(insert_at, created);
        created
    }

    /// Ferme tous les upvalues dont le slot est ≥ `last` : la valeur
    /// déménage de la pile vers l'upvalue, qui quitte la liste ouverte.
    fn close_upvalues(&mut self, last: usize) {
        while let Some(&upvalue) = self.open_upvalues.first() {
            let Location::Open(slot) = self.heap.upvalue(upvalue).location else {
                unreachable!("open list only holds open upvalues");
            };
            if slot < last {
                break;
            }
            let value = self.stack[slot];
            self.heap.upvalue_mut(upvalue).location = Location::Closed(value);
            self.open_upvalues.remove(0);
        }
    }

    // ---------- Allocation enracinée & GC ----------

    fn alloc_obj(&mut self, obj: Obj) -> ObjRef {
        if self.options.stress_gc || self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.alloc(obj)
    }

    fn intern(&mut self, s: &str) -> ObjRef {
        if self.options.stress_gc || self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.intern(s)
    }

    fn intern_owned(&mut self, s: String) -> ObjRef {
        if self.options.stress_gc || self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.intern_owned(s)
    }

    /// Un cycle complet : racines, trace, balayage.
    fn collect_garbage(&mut self) {
        log::trace!("gc: begin, {} bytes allocated", self.heap.bytes_allocated());
        for &value in &self.stack {
            self.heap.mark_value(value);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.closure);
        }
        for &upvalue in &self.open_upvalues {
            self.heap.mark_object(upvalue);
        }
        self.heap.mark_table(&self.globals);
        self.heap.mark_object(self.init_string);
        self.heap.trace();
        self.heap.sweep();
    }

    // ---------- Trace d'exécution ----------

    fn trace_instruction(&self) {
        let mut line = String::from("          ");
        for &value in &self.stack {
            let _ = write!(line, "[ {} ]", print_value(&self.heap, value));
        }
        eprintln!("{line}");
        let (text, _) = disasm::disassemble_instruction(&self.heap, self.chunk(), self.frame().ip);
        eprintln!("{text}");
    }
}
