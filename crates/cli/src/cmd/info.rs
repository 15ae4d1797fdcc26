use playbuild_lib::config::Config;
use playbuild_lib::platform::paths::{cache_dir, data_dir};

pub fn cmd_info(config: &Config) {
  println!("Configuration:");
  println!("  Root: {}", config.root.display());
  match &config.local_path {
    Some(local) => println!("  Local packages: {}", local.display()),
    None => println!("  Local packages: (none)"),
  }
  println!("  Mirror: {}", config.mirror.as_deref().unwrap_or("(none)"));
  println!("  Allowed hosts: {}", config.allowed_hosts.join(", "));
  println!(
    "  Instruction timeout: {}",
    humantime::format_duration(config.instruction_timeout)
  );
  println!("  Parallelism: {}", config.parallelism);
  println!("  Excluded: {}", config.exclude.join(", "));
  println!("  Data dir: {}", data_dir().display());
  println!("  Cache dir: {}", cache_dir().display());
}
