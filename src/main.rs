fn main() {
    place_map_lib::run()
}
