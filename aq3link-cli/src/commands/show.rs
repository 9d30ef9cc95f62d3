//! Program store display.

use {
    anyhow::{Context, Result},
    aq3link::ProgramStore,
    std::{fmt::Write as _, path::Path},
};

/// Show command implementation.
pub(crate) fn cmd_show(file: &Path, json: bool) -> Result<()> {
    let store = ProgramStore::load(file)
        .with_context(|| format!("Failed to read program image {}", file.display()))?;
    print_store(&store, json)
}

/// Print a store to stdout, as a listing or as JSON.
pub(crate) fn print_store(store: &ProgramStore, json: bool) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": store_json(store),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", render_store(store));
    }
    Ok(())
}

fn store_json(store: &ProgramStore) -> serde_json::Value {
    let programs: Vec<_> = store
        .programs
        .iter()
        .map(|p| p.to_json_view())
        .collect();
    serde_json::json!({
        "info": {
            "file_name": store.info.file_name,
            "date": store.info.display_date(),
        },
        "programs": programs,
    })
}

fn render_store(store: &ProgramStore) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Program file: {} ({})",
        store.info.file_name,
        store.info.display_date()
    );
    if store.programs.is_empty() {
        let _ = writeln!(out, "  (no programs)");
        return out;
    }

    for program in &store.programs {
        let edited = if program.is_edited_locally() { " *" } else { "" };
        let _ = writeln!(
            out,
            "{:>3}  {:<33} {}{edited}",
            program.slot,
            program
                .name
                .to_trimmed(),
            program.plate_format()
        );
        for (index, command) in program
            .commands()
            .iter()
            .enumerate()
        {
            let _ = writeln!(out, "       {:>2}. {command}", index + 1);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        aq3link::{BLOCK_SIZE, Block},
    };

    fn sample() -> ProgramStore {
        let mut info: Block = [0u8; BLOCK_SIZE];
        info[1..6].copy_from_slice(b"PLATE");
        info[34..42].copy_from_slice(b"01022003");

        let mut program: Block = [0u8; BLOCK_SIZE];
        program[0] = 1;
        program[1..6].copy_from_slice(b"RINSE");
        program[34] = 1;
        program[69] = 2;
        // SOAK 30 s
        program[106] = 30;
        program[156..158].copy_from_slice(&30u16.to_le_bytes());

        ProgramStore::from_blocks(&[info, program]).unwrap()
    }

    #[test]
    fn test_render_store() {
        let text = render_store(&sample());
        assert!(text.starts_with("Program file: PLATE (01.02.2003)"));
        assert!(text.contains("RINSE"));
        assert!(text.contains("384-well *"));
        assert!(text.contains("1. SOAK"));
    }

    #[test]
    fn test_render_empty_store() {
        let store = ProgramStore::from_blocks(&[[0u8; BLOCK_SIZE]]).unwrap();
        assert!(render_store(&store).contains("(no programs)"));
    }

    #[test]
    fn test_store_json() {
        let value = store_json(&sample());
        assert_eq!(value["info"]["file_name"], "PLATE");
        assert_eq!(value["info"]["date"], "01.02.2003");
        let program = &value["programs"][0];
        assert_eq!(program["name"], "RINSE");
        assert_eq!(program["slot"], 1);
        assert_eq!(program["commands"][0]["kind"], "soak");
        assert_eq!(program["commands"][0]["seconds"], 30);
    }
}
