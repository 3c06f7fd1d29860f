use owo_colors::OwoColorize as _;

fn main() {
  if let Err(err) = workstream::run() {
    anstream::eprintln!("{}", format!("{err:#}").red());
    std::process::exit(1);
  }
}
