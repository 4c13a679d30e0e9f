use std::fs::File;
use std::io::Read;
use std::path::Path;

use goblin::elf::Elf;
use goblin::mach::Mach;
use goblin::pe::PE;
use goblin::Object;
use log::debug;

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};

/// Returns the names of all exports of the binary at `path` starting with `prefix`.
///
/// The binary is parsed statically, nothing gets loaded. Mach-O symbol names are returned without
/// their leading underscore. Universal (fat) Mach-O binaries are not scanned.
pub fn find_export_by_prefix(path: &Path, prefix: &str) -> Result<Vec<String>> {
    let mut file = File::open(path).map_err(|err| {
        debug!("unable to open {:?}: {}", path, err);
        Error(ErrorOrigin::Inventory, ErrorKind::UnableToReadFile)
    })?;

    let mut buffer = vec![];
    file.read_to_end(&mut buffer).map_err(|err| {
        debug!("unable to read {:?}: {}", path, err);
        Error(ErrorOrigin::Inventory, ErrorKind::UnableToReadFile)
    })?;

    let exports = match Object::parse(&buffer) {
        Ok(Object::Elf(elf)) => elf_exports(&elf),
        Ok(Object::PE(pe)) => pe_exports(&pe),
        Ok(Object::Mach(Mach::Binary(macho))) => macho
            .exports()
            .map_err(|_| Error(ErrorOrigin::Inventory, ErrorKind::InvalidExeFile))?
            .into_iter()
            .map(|e| e.name.strip_prefix('_').unwrap_or(&e.name).to_string())
            .collect(),
        Ok(_) => {
            debug!("{:?} is not a supported library format", path);
            return Err(Error(ErrorOrigin::Inventory, ErrorKind::InvalidExeFile));
        }
        Err(err) => {
            debug!("unable to parse {:?}: {}", path, err);
            return Err(Error(ErrorOrigin::Inventory, ErrorKind::InvalidExeFile));
        }
    };

    Ok(exports
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .collect())
}

fn elf_exports(elf: &Elf) -> Vec<String> {
    elf.dynsyms
        .iter()
        .filter(|s| !s.is_import())
        .filter_map(|s| elf.dynstrtab.get_at(s.st_name))
        .map(str::to_string)
        .collect()
}

fn pe_exports(pe: &PE) -> Vec<String> {
    pe.exports
        .iter()
        .filter_map(|e| e.name)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_binary_is_rejected() {
        let path = std::env::temp_dir().join(format!("capflow-util-{}.so", std::process::id()));
        std::fs::write(&path, b"definitely not a shared library").unwrap();
        let res = find_export_by_prefix(&path, "CAPFLOW_CONNECTOR_");
        std::fs::remove_file(&path).ok();
        assert_eq!(
            res,
            Err(Error(ErrorOrigin::Inventory, ErrorKind::InvalidExeFile))
        );
    }

    #[test]
    fn missing_file() {
        let res = find_export_by_prefix(Path::new("/nonexistent/libcapflow_x.so"), "CAPFLOW_OS_");
        assert_eq!(
            res,
            Err(Error(ErrorOrigin::Inventory, ErrorKind::UnableToReadFile))
        );
    }
}
