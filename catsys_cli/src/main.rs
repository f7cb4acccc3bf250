#![deny(
    rust_2018_idioms,
    unreachable_pub,
    unsafe_code,
    unused_imports,
    unused_mut,
    missing_debug_implementations
)]

use catsys::{
    archive::{self, FileEntry},
    magic::Archive,
    resource::{hgx::HgxOptions, ResourceMagic},
    scheme::kifint::{
        self,
        decrypt::{self, DecryptOutcome},
        KifintLookup, KifintType,
    },
};
use colored::*;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io::Read;
use std::{
    fs::File,
    path::{Path, PathBuf},
};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
struct KeyOpt {
    /// V_CODE2 of the game, asked for when an archive needs it
    #[structopt(short = "k", long = "vcode2")]
    vcode2: Option<String>,
}

#[derive(StructOpt, Debug)]
struct ImageOpt {
    /// Draw frames on a canvas of their full size
    #[structopt(short, long)]
    expand: bool,

    /// Flip frames vertically
    #[structopt(short, long)]
    flip: bool,

    /// Write a JSON file with the frame layout next to the images
    #[structopt(short, long)]
    json: bool,

    /// Reject frames with a damaged alpha channel
    #[structopt(long)]
    strict_alpha: bool,
}

impl ImageOpt {
    fn options(&self) -> HgxOptions {
        HgxOptions {
            expand: self.expand,
            flip: self.flip,
            strict_alpha: self.strict_alpha,
        }
    }
}

#[derive(StructOpt, Debug)]
#[structopt(about = "Extract and convert CatSystem2 game data")]
enum Opt {
    /// List files stored in archives
    List {
        #[structopt(flatten)]
        key: KeyOpt,

        #[structopt(required = true, name = "ARCHIVES", parse(from_os_str))]
        files: Vec<PathBuf>,
    },
    /// Extract files from archives
    Extract {
        #[structopt(flatten)]
        key: KeyOpt,

        #[structopt(required = true, name = "ARCHIVES", parse(from_os_str))]
        files: Vec<PathBuf>,

        /// Directory to output extracted files
        #[structopt(
            short = "o",
            long = "output",
            parse(from_os_str),
            default_value = "ext/"
        )]
        output_dir: PathBuf,

        /// Convert HG-2/HG-3 images to PNG while extracting
        #[structopt(short, long)]
        convert: bool,

        #[structopt(flatten)]
        image: ImageOpt,
    },
    /// Extract files by name from all archives of one type
    Lookup {
        #[structopt(flatten)]
        key: KeyOpt,

        /// Game installation directory
        #[structopt(parse(from_os_str))]
        install_dir: PathBuf,

        /// Archive type, e.g. image, scene or bgm
        #[structopt(short = "t", long = "type", default_value = "image")]
        archive_type: KifintType,

        #[structopt(required = true, name = "NAMES")]
        names: Vec<String>,

        #[structopt(
            short = "o",
            long = "output",
            parse(from_os_str),
            default_value = "ext/"
        )]
        output_dir: PathBuf,
    },
    /// Convert HG-2/HG-3 images to PNG
    Convert {
        #[structopt(required = true, name = "FILES", parse(from_os_str))]
        files: Vec<PathBuf>,

        /// Directory to output images, next to the input by default
        #[structopt(short = "o", long = "output", parse(from_os_str))]
        output_dir: Option<PathBuf>,

        #[structopt(flatten)]
        image: ImageOpt,
    },
    /// Decrypt archives in place, keeping backups
    Decrypt {
        #[structopt(flatten)]
        key: KeyOpt,

        #[structopt(parse(from_os_str))]
        install_dir: PathBuf,

        #[structopt(short, long, default_value = "*.int")]
        wildcard: String,
    },
    /// Put backed up archives back in place
    Restore {
        #[structopt(parse(from_os_str))]
        install_dir: PathBuf,

        #[structopt(short, long, default_value = "*.int")]
        wildcard: String,
    },
    /// Show which file types archives contain
    Identify {
        #[structopt(flatten)]
        key: KeyOpt,

        #[structopt(required = true, name = "ARCHIVES", parse(from_os_str))]
        files: Vec<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    match run(&opt) {
        Ok(_) => (),
        Err(err) => {
            log::error!("Error: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn run(opt: &Opt) -> anyhow::Result<()> {
    match opt {
        Opt::List { key, files } => list_archives(key, files),
        Opt::Extract {
            key,
            files,
            output_dir,
            convert,
            image,
        } => extract_archives(key, files, output_dir, *convert, image),
        Opt::Lookup {
            key,
            install_dir,
            archive_type,
            names,
            output_dir,
        } => lookup_files(key, install_dir, *archive_type, names, output_dir),
        Opt::Convert {
            files,
            output_dir,
            image,
        } => convert_resources(files, output_dir.as_deref(), image),
        Opt::Decrypt {
            key,
            install_dir,
            wildcard,
        } => decrypt_install(key, install_dir, wildcard),
        Opt::Restore {
            install_dir,
            wildcard,
        } => {
            let restored = decrypt::restore_archives(install_dir, wildcard)?;
            for path in &restored {
                println!("{} {:?}", "Restored".green(), path);
            }
            if restored.is_empty() {
                println!("{}", "Nothing to restore".yellow());
            }
            Ok(())
        }
        Opt::Identify { key, files } => {
            let vcode2 = resolve_vcode2(key, files);
            for file in kifint_files(files)? {
                match kifint::identify_file_types(&file, &vcode2) {
                    Ok(types) => println!(
                        "{:?}: {}",
                        file,
                        types.into_iter().collect::<Vec<_>>().join(" ").green()
                    ),
                    Err(err) => log::error!("{:?}: {:#}", file, err),
                }
            }
            Ok(())
        }
    }
}

/// Archives among `files`, with a warning for everything else.
fn kifint_files(files: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut ret = Vec::new();
    for file in files.iter().filter(|file| file.is_file()) {
        let mut magic = vec![0; 4];
        let read = File::open(&file)?.read(&mut magic)?;
        let archive_magic = Archive::parse(&magic[..read]);
        log::debug!("Archive: {:?}", archive_magic);
        match archive_magic {
            Archive::Kifint => ret.push(file.clone()),
            Archive::NotRecognized => println!(
                "{}",
                format!(
                    "{:?} is not a {} archive, skipping",
                    file,
                    Archive::names().join("/")
                )
                .yellow()
            ),
        }
    }
    Ok(ret)
}

/// The key given on the command line, or asked for when one of `files` is
/// encrypted.
fn resolve_vcode2(key: &KeyOpt, files: &[PathBuf]) -> String {
    if let Some(vcode2) = &key.vcode2 {
        return vcode2.clone();
    }
    let needed = files
        .iter()
        .any(|file| kifint::is_encrypted_archive(file).unwrap_or(false));
    if needed {
        prompt_for_vcode2()
    } else {
        String::new()
    }
}

fn prompt_for_vcode2() -> String {
    use read_input::prelude::*;

    input::<String>()
        .repeat_msg("Enter V_CODE2 of the game: ")
        .add_err_test(|s| !s.is_empty(), "V_CODE2 can not be empty".red())
        .get()
}

fn list_archives(key: &KeyOpt, files: &[PathBuf]) -> anyhow::Result<()> {
    let files = kifint_files(files)?;
    let vcode2 = resolve_vcode2(key, &files);
    for file in files {
        let archive = match Archive::Kifint.open(&file, &vcode2) {
            Ok(archive) => archive,
            Err(err) => {
                log::error!("{:?}: {:#}", file, err);
                continue;
            }
        };
        println!("{}", format!("{:?}", file).yellow());
        for entry in archive.entries() {
            println!(
                "{:>5} {:>#10X} {:>10} {}",
                entry.index, entry.file_offset, entry.file_size, entry.file_name
            );
        }
    }
    Ok(())
}

fn extract_archives(
    key: &KeyOpt,
    files: &[PathBuf],
    output_dir: &Path,
    convert: bool,
    image: &ImageOpt,
) -> anyhow::Result<()> {
    let files = kifint_files(files)?;
    let vcode2 = resolve_vcode2(key, &files);
    let options = image.options();
    files.iter().try_for_each(|file| {
        let archive = match Archive::Kifint.open(file, &vcode2) {
            Ok(archive) => archive,
            Err(err) => {
                log::error!("{:?}: {:#}", file, err);
                return Ok(());
            }
        };
        let entries = archive.entries();
        let progress_bar =
            init_progressbar(&format!("Extracting: {:?}", file), entries.len() as u64);

        entries
            .par_iter()
            .progress_with(progress_bar)
            .for_each(|entry| {
                let result = extract_entry(
                    archive.as_ref(),
                    entry,
                    output_dir,
                    convert,
                    image.json,
                    &options,
                );
                if let Err(err) = result {
                    log::error!("{}: {:#}", entry.file_name, err);
                }
            });
        Ok(())
    })
}

/// Write one entry below `output_dir`, as PNG frames when converting and
/// the entry is an image.
fn extract_entry(
    source: &dyn archive::Archive,
    entry: &FileEntry,
    output_dir: &Path,
    convert: bool,
    write_json: bool,
    options: &HgxOptions,
) -> anyhow::Result<()> {
    if !convert {
        source.write_entry(entry, output_dir)?;
        return Ok(());
    }
    let buf = source.extract(entry)?;
    let resource_magic = ResourceMagic::parse_magic(&buf);
    if resource_magic.is_image() {
        let output_file_name = entry.output_path(output_dir)?;
        let dir = output_file_name.parent().unwrap_or(output_dir);
        resource_magic
            .parse(&entry.file_name, &buf, options)?
            .write(dir, options, write_json)?;
    } else {
        entry.write(&buf, output_dir)?;
    }
    Ok(())
}

fn lookup_files(
    key: &KeyOpt,
    install_dir: &Path,
    archive_type: KifintType,
    names: &[String],
    output_dir: &Path,
) -> anyhow::Result<()> {
    let paths = archive_type.find_archives(install_dir)?;
    let vcode2 = resolve_vcode2(key, &paths);
    let mut lookup = KifintLookup::load(archive_type, install_dir, &vcode2)?;
    if archive_type != KifintType::Update {
        let update = KifintLookup::load(KifintType::Update, install_dir, &vcode2)?;
        if !update.is_empty() {
            lookup.set_update(update);
        }
    }
    log::debug!(
        "{} files in {} archives",
        lookup.len(),
        lookup.archives().len()
    );
    for name in names {
        match lookup.get(name) {
            Some((archive, entry)) => {
                let path = entry.write(&lookup.extract(name)?, output_dir)?;
                println!("{:?} from {}", path, archive.file_name().green());
            }
            None => println!("{}", format!("{} not found", name).yellow()),
        }
    }
    Ok(())
}

fn convert_resources(
    files: &[PathBuf],
    output_dir: Option<&Path>,
    image: &ImageOpt,
) -> anyhow::Result<()> {
    let options = image.options();
    let progress_bar = init_progressbar("Converting...", files.len() as u64);

    files
        .par_iter()
        .progress_with(progress_bar)
        .filter(|file| file.is_file())
        .try_for_each(|file| {
            let mut contents = Vec::with_capacity(catsys::ONE_MB);
            log::debug!("Converting: {:?}", file);
            File::open(&file)?.read_to_end(&mut contents)?;
            let resource_magic = ResourceMagic::parse_magic(&contents);
            if !resource_magic.is_image() {
                log::warn!("{:?}: not an HG-2/HG-3 image", file);
                return Ok(());
            }
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dir = match output_dir {
                Some(dir) => dir.to_path_buf(),
                None => file
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
            };
            match resource_magic
                .parse(&file_name, &contents, &options)
                .and_then(|r| r.write(&dir, &options, image.json))
            {
                Ok(_) => Ok(()),
                Err(err) => {
                    log::error!("{:?}: {:#}", file, err);
                    Ok(())
                }
            }
        })
}

fn decrypt_install(key: &KeyOpt, install_dir: &Path, wildcard: &str) -> anyhow::Result<()> {
    let paths = kifint::kind::find_archives(install_dir, wildcard)?;
    let vcode2 = resolve_vcode2(key, &paths);
    for (path, result) in decrypt::decrypt_archives(install_dir, wildcard, &vcode2)? {
        match result {
            Ok(DecryptOutcome::Decrypted) => println!("{} {:?}", "Decrypted".green(), path),
            Ok(DecryptOutcome::Resumed) => {
                println!("{} {:?}", "Decrypted from backup".green(), path)
            }
            Ok(DecryptOutcome::AlreadyDecrypted) => {
                println!("{} {:?}", "Not encrypted".yellow(), path)
            }
            Err(err) => println!("{} {:?}: {:#}", "Failed".red(), path, err),
        }
    }
    Ok(())
}

fn init_progressbar(prefix: &str, size: u64) -> ProgressBar {
    let progress_bar = ProgressBar::new(size).with_style(
        ProgressStyle::default_bar().template(
            " {spinner} {prefix} {wide_bar:} {pos:>6}/{len:6} ETA:[{eta}]",
        ),
    );
    progress_bar.set_prefix(prefix);
    progress_bar
}
