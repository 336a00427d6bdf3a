//! Text MIR parser implementation

use super::{ParseError, ParseResult};
use crate::mir::{MachineBlock, MachineFunction, MachineInst, Module, Opcode, Operand, VReg};

pub struct Parser<'input> {
    lines: std::iter::Peekable<std::iter::Enumerate<std::str::Lines<'input>>>,
    current_line: usize,
}

impl<'input> Parser<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            lines: input.lines().enumerate().peekable(),
            current_line: 0,
        }
    }

    /// Next non-empty line with comments stripped.
    fn next_line(&mut self) -> Option<&'input str> {
        for (idx, raw) in self.lines.by_ref() {
            self.current_line = idx + 1;
            let text = strip_comment(raw).trim();
            if !text.is_empty() {
                return Some(text);
            }
        }
        None
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::ParseError {
            line: self.current_line,
            message: message.into(),
        }
    }

    pub fn parse_module(&mut self, name: &str) -> ParseResult<Module> {
        let mut module = Module::new(name);

        while let Some(line) = self.next_line() {
            let header = line
                .strip_prefix("func ")
                .and_then(|rest| rest.trim().strip_suffix('{'))
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| self.error(format!("Expected 'func NAME {{', got '{}'", line)))?;

            if module.get_function(header).is_some() {
                return Err(self.error(format!("Function '{}' is defined twice", header)));
            }
            let func = self.parse_function(header)?;
            module.add_function(func);
        }

        Ok(module)
    }

    fn parse_function(&mut self, name: &str) -> ParseResult<MachineFunction> {
        let mut func = MachineFunction::new(name);
        let mut current: Option<MachineBlock> = None;

        loop {
            let line = self
                .next_line()
                .ok_or_else(|| ParseError::UnexpectedEof(name.to_string()))?;

            if line == "}" {
                break;
            }

            if let Some(rest) = line.strip_prefix("block ") {
                if let Some(block) = current.take() {
                    func.add_block(block);
                }
                let block = self.parse_block_header(rest)?;
                if func.get_block(&block.label).is_some() {
                    return Err(self.error(format!("Block '{}' is defined twice", block.label)));
                }
                current = Some(block);
                continue;
            }

            let mut words = line.split_whitespace();
            match words.next() {
                Some("param") => {
                    let vreg = self.parse_vreg(words.next())?;
                    func.reserve_vreg(vreg);
                    func.params.push(vreg);
                }
                Some("ret") if words.clone().next().is_some() => {
                    let vreg = self.parse_vreg(words.next())?;
                    func.reserve_vreg(vreg);
                    func.ret_vreg = Some(vreg);
                }
                Some("class") => {
                    let vreg = self.parse_vreg(words.next())?;
                    let class = words
                        .next()
                        .ok_or_else(|| self.error("Expected register class name"))?;
                    func.set_class(vreg, class);
                }
                Some("hint") => {
                    let vreg = self.parse_vreg(words.next())?;
                    let rest: String = words.collect();
                    let names: Vec<&str> = rest
                        .split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .collect();
                    if names.is_empty() {
                        return Err(self.error("Expected at least one hinted register"));
                    }
                    for reg in names {
                        func.add_hint(vreg, reg);
                    }
                }
                _ => {
                    let inst = self.parse_instruction(line)?;
                    for vreg in inst.uses().into_iter().chain(inst.def()) {
                        func.reserve_vreg(vreg);
                    }
                    match current.as_mut() {
                        Some(block) => block.push(inst),
                        None => return Err(self.error("Instruction outside of a block")),
                    }
                }
            }
        }

        if let Some(block) = current.take() {
            func.add_block(block);
        }

        for block in func.iter_blocks() {
            if let Some(term) = block.terminator() {
                if let Some(target) = term.target() {
                    if func.get_block(target).is_none() {
                        return Err(ParseError::UnknownLabel {
                            func: func.name.clone(),
                            label: target.to_string(),
                        });
                    }
                }
            }
        }
        func.rebuild_cfg();

        Ok(func)
    }

    /// `LABEL:` or `LABEL depth N:`
    fn parse_block_header(&self, rest: &str) -> ParseResult<MachineBlock> {
        let body = rest
            .trim()
            .strip_suffix(':')
            .ok_or_else(|| self.error("Block header must end with ':'"))?;
        let parts: Vec<&str> = body.split_whitespace().collect();
        match parts.as_slice() {
            [label] => Ok(MachineBlock::new(*label)),
            [label, "depth", depth] => {
                let depth: u32 = depth
                    .parse()
                    .map_err(|_| self.error(format!("Invalid loop depth '{}'", depth)))?;
                Ok(MachineBlock::new(*label).with_depth(depth))
            }
            _ => Err(self.error(format!("Invalid block header 'block {}'", rest))),
        }
    }

    fn parse_vreg(&self, word: Option<&str>) -> ParseResult<VReg> {
        let word = word.ok_or_else(|| self.error("Expected a virtual register"))?;
        word.parse().map_err(|_| ParseError::InvalidOperand {
            line: self.current_line,
            operand: word.to_string(),
        })
    }

    fn parse_instruction(&self, line: &str) -> ParseResult<MachineInst> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, r)) => (m, r.trim()),
            None => (line, ""),
        };
        let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| ParseError::InvalidInstruction {
            line: self.current_line,
            text: line.to_string(),
        })?;

        let operands = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',')
                .map(|op| self.parse_operand(op.trim()))
                .collect::<ParseResult<Vec<_>>>()?
        };

        let mut inst = MachineInst::new(opcode);
        let mut operands = operands.into_iter();
        if opcode.has_dst() {
            match operands.next() {
                Some(dst @ Operand::VReg(_)) => inst = inst.dst(dst),
                _ => {
                    return Err(ParseError::InvalidInstruction {
                        line: self.current_line,
                        text: format!("'{}' needs a destination register", line),
                    })
                }
            }
        }
        for op in operands {
            inst = inst.src(op);
        }
        Ok(inst)
    }

    fn parse_operand(&self, text: &str) -> ParseResult<Operand> {
        let invalid = || ParseError::InvalidOperand {
            line: self.current_line,
            operand: text.to_string(),
        };

        if text.is_empty() {
            return Err(invalid());
        }

        // offset(vN)
        if let Some(open) = text.find('(') {
            let close = text.strip_suffix(')').ok_or_else(invalid)?;
            let offset = if open == 0 {
                0
            } else {
                text[..open].parse::<i32>().map_err(|_| invalid())?
            };
            let base: VReg = close[open + 1..].parse().map_err(|_| invalid())?;
            return Ok(Operand::Mem { base, offset });
        }

        if let Ok(vreg) = text.parse::<VReg>() {
            return Ok(Operand::VReg(vreg));
        }
        if let Ok(imm) = text.parse::<i64>() {
            return Ok(Operand::Imm(imm));
        }
        if let Some(hex) = text.strip_prefix("0x") {
            return i64::from_str_radix(hex, 16).map(Operand::Imm).map_err(|_| invalid());
        }
        if text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
            && !text.starts_with(|c: char| c.is_ascii_digit())
        {
            return Ok(Operand::Label(text.to_string()));
        }
        Err(invalid())
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(|c: char| c == '#' || c == ';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Parse text MIR into a module named `module`.
pub fn parse(source: &str) -> ParseResult<Module> {
    parse_named("module", source)
}

/// Parse text MIR into a module with the given name.
pub fn parse_named(name: &str, source: &str) -> ParseResult<Module> {
    let mut parser = Parser::new(source);
    parser.parse_module(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP: &str = r#"
# count to ten
func count {
    ret v0
block entry:
    li v0, 0
    li v1, 10
block body depth 1:
    addi v0, v0, 1      ; increment
    blt v0, v1, body
block exit:
    ret
}
"#;

    #[test]
    fn test_parse_function() {
        let module = parse(LOOP).unwrap();
        let func = module.get_function("count").unwrap();

        assert_eq!(func.block_labels(), vec!["entry", "body", "exit"]);
        assert_eq!(func.get_block("body").unwrap().loop_depth, 1);
        assert_eq!(func.ret_vreg, Some(VReg(0)));
        assert_eq!(func.num_insts(), 5);
        assert_eq!(func.num_vregs(), 2);
        assert_eq!(func.get_block("body").unwrap().succs, vec!["body", "exit"]);
    }

    #[test]
    fn test_parse_operands() {
        let src = "func f {\nblock b:\n    lw v1, -8(v0)\n    sw v1, (v0)\n    li v2, 0x10\n    call helper\n}\n";
        let module = parse(src).unwrap();
        let insts = &module.get_function("f").unwrap().get_block("b").unwrap().insts;

        assert_eq!(insts[0], MachineInst::lw(VReg(1), VReg(0), -8));
        assert_eq!(insts[1], MachineInst::sw(VReg(1), VReg(0), 0));
        assert_eq!(insts[2], MachineInst::li(VReg(2), 16));
        assert_eq!(insts[3].target(), Some("helper"));
    }

    #[test]
    fn test_parse_directives() {
        let src = "func f {\n    param v3\n    class v3 fpr64\n    hint v3 d1, d0\nblock b:\n    mov v4, v3\n}\n";
        let module = parse(src).unwrap();
        let func = module.get_function("f").unwrap();

        assert_eq!(func.params, vec![VReg(3)]);
        assert_eq!(func.reg_classes.get(&VReg(3)).map(String::as_str), Some("fpr64"));
        assert_eq!(func.hints[&VReg(3)], vec!["d1".to_string(), "d0".to_string()]);
        assert_eq!(func.num_vregs(), 5);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse("func f {\nblock b:\n    ret\n").unwrap_err(),
            ParseError::UnexpectedEof("f".to_string())
        );
        assert!(matches!(
            parse("func f {\nblock b:\n    frob v0\n}\n"),
            Err(ParseError::InvalidInstruction { line: 3, .. })
        ));
        assert!(matches!(
            parse("func f {\nblock b:\n    add v0, v1, @x\n}\n"),
            Err(ParseError::InvalidOperand { line: 3, .. })
        ));
        assert!(matches!(
            parse("func f {\nblock b:\n    beq v0, v1, nowhere\n}\n"),
            Err(ParseError::UnknownLabel { .. })
        ));
        assert!(matches!(
            parse("func f {\n    li v0, 1\n}\n"),
            Err(ParseError::ParseError { line: 2, .. })
        ));
        assert!(matches!(parse("nonsense\n"), Err(ParseError::ParseError { line: 1, .. })));
    }

    #[test]
    fn test_display_parses_back() {
        let module = parse(LOOP).unwrap();
        let text = module.get_function("count").unwrap().to_string();
        assert!(text.contains("addi v0, v0, 1"));
        assert!(text.contains("block body depth 1:"));

        let again = parse(&text).unwrap();
        assert_eq!(again.get_function("count").unwrap().to_string(), text);
    }
}
