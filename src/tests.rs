use crate::lr35902::cpu::Cpu;
use crate::lr35902::sm83::{Register, Sm83};
use crate::memory::mmu::Mmu;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

const VECTOR_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/external/sm83/v1");

const REGISTERS: [(Register, &str); 8] = [
    (Register::A, "a"),
    (Register::F, "f"),
    (Register::B, "b"),
    (Register::C, "c"),
    (Register::D, "d"),
    (Register::E, "e"),
    (Register::H, "h"),
    (Register::L, "l"),
];

fn field(state: &Map<String, Value>, key: &str) -> u64 {
    state.get(key).unwrap().as_u64().unwrap()
}

fn ram(state: &Map<String, Value>) -> Vec<(u16, u8)> {
    state
        .get("ram")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            let entry = entry.as_array().unwrap();
            (entry[0].as_u64().unwrap() as u16, entry[1].as_u64().unwrap() as u8)
        })
        .collect()
}

fn run_vectors(file: &str, input: &str) {
    let tests: Value = serde_json::from_str(input).unwrap();
    let sm83 = Sm83::new();

    for test in tests.as_array().unwrap() {
        let mut mmu = Mmu::new();
        let mut cpu = Cpu::new();

        let test = test.as_object().unwrap();
        let name = format!("{}/{}", file, test.get("name").unwrap().as_str().unwrap());
        let initial = test.get("initial").unwrap().as_object().unwrap();
        let final_state = test.get("final").unwrap().as_object().unwrap();

        for (register, key) in REGISTERS.iter() {
            cpu.write_register(register, field(initial, key) as u8).unwrap();
        }
        cpu.write_register16(&Register::SP, field(initial, "sp") as u16).unwrap();
        cpu.write_register16(&Register::PC, field(initial, "pc") as u16).unwrap();

        for (addr, value) in ram(initial) {
            mmu.write(addr, value);
        }

        let pc = cpu.read_register16(&Register::PC).unwrap();
        match sm83.decode(&mmu, pc, false) {
            Ok(instruction) => println!("{}: {}", name, instruction),
            Err(e) => panic!("Failed to decode instruction for {}: {}", name, e),
        }

        let cycles = cpu.step(&mut mmu).unwrap();

        for (register, key) in REGISTERS.iter() {
            assert_eq!(
                cpu.read_register(register).unwrap(),
                field(final_state, key) as u8,
                "Comparison with register {} failed for {}",
                register,
                name
            );
        }
        assert_eq!(
            cpu.read_register16(&Register::SP).unwrap(),
            field(final_state, "sp") as u16,
            "Comparison with register SP failed for {}",
            name
        );
        assert_eq!(
            cpu.read_register16(&Register::PC).unwrap(),
            field(final_state, "pc") as u16,
            "Comparison with register PC failed for {}",
            name
        );

        for (addr, value) in ram(final_state) {
            assert_eq!(mmu.read(addr), value, "Comparison with RAM failed for {}", name);
        }

        // Either a T-cycle count or one entry per M-cycle of bus activity.
        let expected_cycles = match test.get("cycles").unwrap() {
            Value::Array(entries) => entries.len() * 4,
            count => count.as_u64().unwrap() as usize,
        };
        assert_eq!(
            cycles,
            expected_cycles,
            "Comparison with cycle count failed for {}",
            name
        );
    }
}

#[test]
fn test_cpu() {
    let mut files = fs::read_dir(VECTOR_DIR)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|extension| extension == "json"))
        .collect::<Vec<PathBuf>>();
    files.sort();
    assert!(files.len() >= 500, "Expected one vector file per opcode in {}", VECTOR_DIR);

    for path in files {
        let file = path.file_stem().unwrap().to_string_lossy().into_owned();
        let input = fs::read_to_string(&path).unwrap();
        run_vectors(&file, &input);
    }
}

#[test]
fn boundary_functions_drive_a_fresh_engine() {
    let mut gb = crate::get_emulator("blank.gb");
    let mut image = vec![0u8; 0x8000];
    image[0x14d] = 0xe7;

    crate::load_cartridge_data(&mut gb, &image).unwrap();
    crate::reset(&mut gb);
    assert!(!crate::should_redraw_display(&gb));

    assert!(crate::run_until_redraw(&mut gb).unwrap());
    assert!(crate::should_redraw_display(&gb));
    assert_eq!(crate::display_buffer(&gb).len(), 160 * 144 * 4);
}
